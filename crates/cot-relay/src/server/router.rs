// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Send primitives over the client registry.
//!
//! Three addressing modes:
//!
//! 1. Broadcast to every client except the author
//! 2. Direct to one uid
//! 3. Direct to every client sharing a callsign
//!
//! Each mode comes in a raw form (already-encoded bytes, used to forward
//! inbound traffic untouched) and an event form that encodes first. Sends
//! are fire-and-forget: a full or closed client queue drops that copy.

use super::clients::{ClientHandle, ClientRegistry};
use crate::cot::{self, Event};
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Delivery statistics.
#[derive(Debug, Default)]
pub struct RouterStats {
    /// Copies handed to client queues.
    pub messages_sent: AtomicU64,
    /// Bytes handed to client queues.
    pub bytes_sent: AtomicU64,
    /// Copies dropped (queue full or client gone).
    pub dropped: AtomicU64,
    /// Outbound events that failed to encode.
    pub encode_errors: AtomicU64,
}

/// Point-in-time copy of [`RouterStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStatsSnapshot {
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub dropped: u64,
    pub encode_errors: u64,
}

impl RouterStats {
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Stateless router; cheap to clone.
#[derive(Debug, Clone)]
pub struct Router {
    clients: Arc<ClientRegistry>,
    stats: Arc<RouterStats>,
}

impl Router {
    /// Create a router over the given registry.
    pub fn new(clients: Arc<ClientRegistry>) -> Self {
        Self {
            clients,
            stats: Arc::new(RouterStats::default()),
        }
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Send to every client except `author`. Returns the number of copies queued.
    pub async fn broadcast(&self, msg: Bytes, author: &str) -> usize {
        let mut sent = 0;
        self.clients
            .for_each(Some(author), |_, handle| {
                if self.hand_off(handle, &msg) {
                    sent += 1;
                }
            })
            .await;
        sent
    }

    /// Send to the client registered under `uid`, if any.
    pub async fn send_to(&self, msg: Bytes, uid: &str) -> usize {
        match self.clients.get(uid).await {
            Some(handle) => usize::from(self.hand_off(&handle, &msg)),
            None => 0,
        }
    }

    /// Send to every client whose callsign equals `callsign`.
    pub async fn send_to_callsign(&self, msg: Bytes, callsign: &str) -> usize {
        let mut sent = 0;
        self.clients
            .for_each(None, |_, handle| {
                if handle.callsign() == callsign && self.hand_off(handle, &msg) {
                    sent += 1;
                }
            })
            .await;
        sent
    }

    pub async fn broadcast_event(&self, event: &Event, author: &str) -> usize {
        match self.encode(event) {
            Some(msg) => self.broadcast(msg, author).await,
            None => 0,
        }
    }

    pub async fn send_event_to(&self, event: &Event, uid: &str) -> usize {
        match self.encode(event) {
            Some(msg) => self.send_to(msg, uid).await,
            None => 0,
        }
    }

    pub async fn send_event_to_callsign(&self, event: &Event, callsign: &str) -> usize {
        match self.encode(event) {
            Some(msg) => self.send_to_callsign(msg, callsign).await,
            None => 0,
        }
    }

    fn encode(&self, event: &Event) -> Option<Bytes> {
        match cot::encode(event) {
            Ok(msg) => Some(msg),
            Err(e) => {
                self.stats.encode_errors.fetch_add(1, Ordering::Relaxed);
                error!("Failed to encode {} event: {}", event.cot_type, e);
                None
            }
        }
    }

    fn hand_off(&self, handle: &ClientHandle, msg: &Bytes) -> bool {
        if handle.deliver(msg.clone()) {
            self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
            self.stats
                .bytes_sent
                .fetch_add(msg.len() as u64, Ordering::Relaxed);
            true
        } else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    async fn register(
        reg: &ClientRegistry,
        uid: &str,
        callsign: &str,
        capacity: usize,
    ) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(capacity);
        let peer = SocketAddr::from(([127, 0, 0, 1], 9000));
        let handle = ClientHandle::new(reg.len().await as u64, peer, tx).with_callsign(callsign);
        reg.add(uid, handle).await;
        rx
    }

    #[tokio::test]
    async fn test_router_new() {
        let router = Router::new(Arc::new(ClientRegistry::new()));
        assert_eq!(router.stats(), RouterStatsSnapshot::default());
        assert_eq!(router.broadcast(Bytes::from_static(b"x"), "A").await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_skips_author() {
        let reg = Arc::new(ClientRegistry::new());
        let mut rx_a = register(&reg, "A", "ALPHA", 10).await;
        let mut rx_b = register(&reg, "B", "BRAVO", 10).await;
        let mut rx_c = register(&reg, "C", "", 10).await;
        let router = Router::new(reg);

        let sent = router.broadcast(Bytes::from_static(b"hello"), "A").await;
        assert_eq!(sent, 2);

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(rx_c.try_recv().unwrap(), Bytes::from_static(b"hello"));

        let stats = router.stats();
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.bytes_sent, 10);
    }

    #[tokio::test]
    async fn test_broadcast_from_unregistered_author_reaches_all() {
        let reg = Arc::new(ClientRegistry::new());
        let _rx_a = register(&reg, "A", "", 10).await;
        let _rx_b = register(&reg, "B", "", 10).await;
        let router = Router::new(reg);

        assert_eq!(router.broadcast(Bytes::from_static(b"x"), "udp-sender").await, 2);
    }

    #[tokio::test]
    async fn test_send_to() {
        let reg = Arc::new(ClientRegistry::new());
        let mut rx_a = register(&reg, "A", "", 10).await;
        let mut rx_b = register(&reg, "B", "", 10).await;
        let router = Router::new(reg);

        assert_eq!(router.send_to(Bytes::from_static(b"direct"), "B").await, 1);
        assert_eq!(router.send_to(Bytes::from_static(b"direct"), "Z").await, 0);

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), Bytes::from_static(b"direct"));
    }

    #[tokio::test]
    async fn test_send_to_callsign_group() {
        let reg = Arc::new(ClientRegistry::new());
        let mut rx_1 = register(&reg, "A1", "ALPHA", 10).await;
        let mut rx_2 = register(&reg, "A2", "ALPHA", 10).await;
        let mut rx_3 = register(&reg, "B1", "BRAVO", 10).await;
        let router = Router::new(reg);

        assert_eq!(router.send_to_callsign(Bytes::from_static(b"m"), "ALPHA").await, 2);
        assert_eq!(router.send_to_callsign(Bytes::from_static(b"m"), "ZULU").await, 0);

        assert!(rx_1.try_recv().is_ok());
        assert!(rx_2.try_recv().is_ok());
        assert!(rx_3.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_drops_copy() {
        let reg = Arc::new(ClientRegistry::new());
        let _rx = register(&reg, "A", "", 1).await;
        let router = Router::new(reg);

        assert_eq!(router.send_to(Bytes::from_static(b"1"), "A").await, 1);
        assert_eq!(router.send_to(Bytes::from_static(b"2"), "A").await, 0);
        assert_eq!(router.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_send_event_to_encodes() {
        let reg = Arc::new(ClientRegistry::new());
        let mut rx = register(&reg, "A", "", 10).await;
        let router = Router::new(reg);

        assert_eq!(router.send_event_to(&cot::make_pong(), "A").await, 1);

        let bytes = rx.try_recv().unwrap();
        let event = cot::decode(&bytes).unwrap();
        assert_eq!(event.cot_type, cot::PONG_TYPE);
    }

    #[tokio::test]
    async fn test_typed_broadcast_and_callsign() {
        let reg = Arc::new(ClientRegistry::new());
        let mut rx_a = register(&reg, "A", "ALPHA", 10).await;
        let mut rx_b = register(&reg, "B", "BRAVO", 10).await;
        let router = Router::new(reg);

        let event = Event::new("a-f-G", "A", chrono::Duration::seconds(30));
        assert_eq!(router.broadcast_event(&event, "A").await, 1);
        assert_eq!(router.send_event_to_callsign(&event, "ALPHA").await, 1);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }
}
