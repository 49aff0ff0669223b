// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP ingestion.
//!
//! Each datagram carries exactly one event. Senders are ingress-only: they
//! are never registered as clients and never receive traffic.

use super::queue::EventSender;
use crate::cot::{self, CotMessage};
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Largest possible UDP payload.
const MAX_DATAGRAM: usize = 65_535;

/// Bound UDP socket feeding the inbound queue.
pub struct DatagramListener {
    socket: UdpSocket,
}

impl DatagramListener {
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive until cancelled or until the queue is closed.
    pub async fn run(self, queue: EventSender, cancel: CancellationToken) {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("UDP listener shutting down");
                    break;
                }
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, peer)) => {
                        if let Some(msg) = decode_datagram(&buf[..len], peer) {
                            if queue.submit(msg, &cancel).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => warn!("UDP receive error: {}", e),
                },
            }
        }

        info!("UDP listener stopped");
    }
}

fn decode_datagram(data: &[u8], peer: SocketAddr) -> Option<CotMessage> {
    match cot::decode_message(Bytes::copy_from_slice(data)) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Dropping datagram from {}: {}", peer, e);
            None
        }
    }
}
