// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event processor: the single consumer of the inbound queue.
//!
//! All registry mutations and routing decisions happen here, one message at a
//! time, so side effects are applied in one total order no matter how many
//! listeners feed the queue.

use super::queue::EventReceiver;
use super::router::Router;
use super::units::{Unit, UnitRegistry};
use crate::cot::{self, CotMessage, MessageKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the processor did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Ping answered; nothing forwarded.
    Pong { delivered: usize },
    /// Forwarded to every client except the author.
    Broadcast { delivered: usize },
    /// Forwarded to clients matching the recipient callsigns.
    Callsigns { delivered: usize },
}

impl Dispatch {
    pub fn delivered(self) -> usize {
        match self {
            Self::Pong { delivered }
            | Self::Broadcast { delivered }
            | Self::Callsigns { delivered } => delivered,
        }
    }
}

/// Appends raw events to one file per event type.
#[derive(Debug, Clone)]
pub struct EventDump {
    dir: PathBuf,
}

impl EventDump {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File receiving events of `cot_type`.
    pub fn path_for(&self, cot_type: &str) -> PathBuf {
        let name: String = cot_type
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.log", name))
    }

    pub async fn append(&self, cot_type: &str, raw: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(cot_type))
            .await?;
        file.write_all(raw).await?;
        file.write_all(b"\n").await?;
        file.flush().await
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Single consumer applying classification, state updates and routing.
pub struct EventProcessor {
    queue: EventReceiver,
    units: Arc<UnitRegistry>,
    router: Router,
    dump: Option<EventDump>,
}

impl EventProcessor {
    pub fn new(queue: EventReceiver, units: Arc<UnitRegistry>, router: Router) -> Self {
        Self {
            queue,
            units,
            router,
            dump: None,
        }
    }

    /// Dump every processed event under `dir`.
    pub fn with_dump(mut self, dump: EventDump) -> Self {
        self.dump = Some(dump);
        self
    }

    /// Drain the queue until cancelled or every producer is gone.
    pub async fn run(mut self, cancel: CancellationToken) {
        debug!("Event processor started");
        while let Some(msg) = self.queue.next(&cancel).await {
            self.process(&msg).await;
        }
        debug!("Event processor stopped");
    }

    /// Apply one message.
    pub async fn process(&self, msg: &CotMessage) -> Dispatch {
        let event = &msg.event;

        if let Some(dump) = &self.dump {
            if let Err(e) = dump.append(&event.cot_type, &msg.raw).await {
                warn!("Failed to dump {} event: {}", event.cot_type, e);
            }
        }

        match msg.kind {
            MessageKind::Ping => {
                debug!("ping from {}", event.uid);
                let delivered = self.router.send_event_to(&cot::make_pong(), &event.uid).await;
                return Dispatch::Pong { delivered };
            }
            MessageKind::Chat => {
                let chat = event.detail.as_ref().and_then(|d| d.chat.as_ref());
                info!(
                    "chat [{}] {}: {}",
                    chat.map(|c| c.chatroom.as_str()).unwrap_or_default(),
                    chat.map(|c| c.sender_callsign.as_str()).unwrap_or_default(),
                    event.text().unwrap_or_default()
                );
            }
            MessageKind::Unit | MessageKind::Point => {
                debug!(
                    "{} {} ({})",
                    if msg.kind == MessageKind::Unit { "pos" } else { "point" },
                    event.uid,
                    event.callsign().unwrap_or_default()
                );
                self.units
                    .upsert(event.uid.clone(), Unit::from_event(event, msg.kind))
                    .await;
            }
            MessageKind::Other => {
                debug!("event {} from {}", event.cot_type, event.uid);
            }
        }

        let mut recipients = event.recipient_callsigns();
        recipients.sort_unstable();
        recipients.dedup();
        if recipients.is_empty() {
            let delivered = self.router.broadcast(msg.raw.clone(), &event.uid).await;
            Dispatch::Broadcast { delivered }
        } else {
            let mut delivered = 0;
            for callsign in recipients {
                delivered += self.router.send_to_callsign(msg.raw.clone(), callsign).await;
            }
            Dispatch::Callsigns { delivered }
        }
    }
}
