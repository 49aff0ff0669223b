// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded inbound queue between the listeners and the event processor.
//!
//! Many producers (one per TCP connection plus the UDP listener), exactly one
//! consumer. When the queue is full producers wait, which throttles every
//! listener uniformly to the pace of the processor. Order is FIFO per
//! producer; no order is imposed across producers.

use crate::cot::CotMessage;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Submission errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Inbound queue closed")]
    Closed,

    #[error("Submission cancelled")]
    Cancelled,
}

/// Create the inbound queue.
pub fn inbound_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer side; one clone per listener task.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<CotMessage>,
}

impl EventSender {
    /// Submit a message, waiting while the queue is full.
    pub async fn submit(
        &self,
        msg: CotMessage,
        cancel: &CancellationToken,
    ) -> Result<(), QueueError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QueueError::Cancelled),
            result = self.tx.send(msg) => result.map_err(|_| QueueError::Closed),
        }
    }

    /// Number of messages that can be submitted without waiting.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// Consumer side, owned by the event processor.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<CotMessage>,
}

impl EventReceiver {
    /// Wait for the next message.
    ///
    /// Returns `None` once cancelled or once every producer is gone.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Option<CotMessage> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            msg = self.rx.recv() => msg,
        }
    }

    /// Take a message if one is pending.
    pub fn try_next(&mut self) -> Option<CotMessage> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cot::Event;
    use bytes::Bytes;
    use std::time::Duration;

    fn message(uid: &str) -> CotMessage {
        let event = Event::new("a-f-G", uid, chrono::Duration::seconds(30));
        CotMessage::new(event, Bytes::from(uid.to_string()))
    }

    #[tokio::test]
    async fn test_fifo_per_producer() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = inbound_queue(4);

        for uid in ["1", "2", "3"] {
            tx.submit(message(uid), &cancel).await.unwrap();
        }

        for uid in ["1", "2", "3"] {
            assert_eq!(rx.next(&cancel).await.unwrap().event.uid, uid);
        }
        assert!(rx.try_next().is_none());
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producer() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = inbound_queue(DEFAULT_QUEUE_CAPACITY);

        for i in 0..DEFAULT_QUEUE_CAPACITY {
            tx.submit(message(&i.to_string()), &cancel).await.unwrap();
        }
        assert_eq!(tx.available(), 0);

        // 21st submission waits
        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            tx.submit(message("overflow"), &cancel),
        )
        .await;
        assert!(blocked.is_err());

        // Producer proceeds once one slot frees up
        let producer = {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { tx.submit(message("overflow"), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(rx.next(&cancel).await.unwrap().event.uid, "0");
        tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer unblocked")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_unblocks_producer() {
        let cancel = CancellationToken::new();
        let (tx, _rx) = inbound_queue(1);
        tx.submit(message("a"), &cancel).await.unwrap();

        let waiter = {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { tx.submit(message("b"), &cancel).await })
        };
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(QueueError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_consumer() {
        let cancel = CancellationToken::new();
        let (_tx, mut rx) = inbound_queue(1);

        let consumer = {
            let cancel = cancel.clone();
            tokio::spawn(async move { rx.next(&cancel).await.is_none() })
        };
        cancel.cancel();
        assert!(consumer.await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let cancel = CancellationToken::new();
        let (tx, rx) = inbound_queue(1);
        drop(rx);
        assert_eq!(
            tx.submit(message("a"), &cancel).await,
            Err(QueueError::Closed)
        );
    }
}
