// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry of connected streaming clients.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::warn;

/// Identifies one accepted connection, so a stale connection closing after a
/// reconnect under the same uid can tell its entry apart from the new one.
pub type SessionId = u64;

/// Egress handle of a connected client.
///
/// Messages are handed to the connection task through a bounded channel;
/// the connection task writes them to the socket.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    session: SessionId,
    peer_addr: SocketAddr,
    callsign: String,
    connected_at: DateTime<Utc>,
    tx: mpsc::Sender<Bytes>,
}

impl ClientHandle {
    /// Create a new client handle.
    pub fn new(session: SessionId, peer_addr: SocketAddr, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            session,
            peer_addr,
            callsign: String::new(),
            connected_at: Utc::now(),
            tx,
        }
    }

    pub fn with_callsign(mut self, callsign: impl Into<String>) -> Self {
        self.callsign = callsign.into();
        self
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Callsign learned from traffic; empty until the client reveals it.
    pub fn callsign(&self) -> &str {
        &self.callsign
    }

    /// Queue bytes for delivery without waiting.
    ///
    /// Returns `false` if the client's queue is full or the connection is gone.
    pub fn deliver(&self, msg: Bytes) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for {}, dropping message", self.peer_addr);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Read-only view of a client for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub uid: String,
    pub callsign: String,
    pub peer: String,
    pub connected_at: DateTime<Utc>,
}

/// Connected clients keyed by their self-asserted uid.
///
/// Mutations take the write lock; traversals share the read lock, so sends
/// run concurrently with each other but never observe a half-applied update.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ClientHandle>>,
}

impl ClientRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a client. Returns the replaced handle, if any.
    pub async fn add(&self, uid: impl Into<String>, handle: ClientHandle) -> Option<ClientHandle> {
        self.clients.write().await.insert(uid.into(), handle)
    }

    /// Remove a client. No-op if absent.
    pub async fn remove(&self, uid: &str) -> Option<ClientHandle> {
        self.clients.write().await.remove(uid)
    }

    /// Remove a client only if the entry still belongs to `session`.
    pub async fn remove_session(&self, uid: &str, session: SessionId) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get(uid) {
            Some(handle) if handle.session == session => {
                clients.remove(uid);
                true
            }
            _ => false,
        }
    }

    /// Update the callsign of a client, only if the entry still belongs to
    /// `session`.
    pub async fn set_callsign(&self, uid: &str, session: SessionId, callsign: &str) -> bool {
        match self.clients.write().await.get_mut(uid) {
            Some(handle) if handle.session == session => {
                handle.callsign = callsign.to_string();
                true
            }
            _ => false,
        }
    }

    /// Visit every client except `except`.
    pub async fn for_each<F>(&self, except: Option<&str>, mut f: F)
    where
        F: FnMut(&str, &ClientHandle),
    {
        let clients = self.clients.read().await;
        for (uid, handle) in clients.iter() {
            if except != Some(uid.as_str()) {
                f(uid, handle);
            }
        }
    }

    /// Get a client by uid.
    pub async fn get(&self, uid: &str) -> Option<ClientHandle> {
        self.clients.read().await.get(uid).cloned()
    }

    /// Get client count.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Copy of the current membership, sorted by uid.
    pub async fn snapshot(&self) -> Vec<ClientInfo> {
        let clients = self.clients.read().await;
        let mut out: Vec<ClientInfo> = clients
            .iter()
            .map(|(uid, h)| ClientInfo {
                uid: uid.clone(),
                callsign: h.callsign.clone(),
                peer: h.peer_addr.to_string(),
                connected_at: h.connected_at,
            })
            .collect();
        out.sort_by(|a, b| a.uid.cmp(&b.uid));
        out
    }
}
