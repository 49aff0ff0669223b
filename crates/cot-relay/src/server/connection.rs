// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Streaming client connection handling.

use super::clients::SessionId;
use crate::cot::{CotError, EventFramer};
use bytes::Bytes;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A connected streaming client.
pub struct ClientConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    session: SessionId,
    framer: EventFramer,
    uid: Option<String>,
    callsign: String,
}

impl ClientConnection {
    /// Create a new client connection.
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        session: SessionId,
        max_message_size: usize,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            session,
            framer: EventFramer::new(max_message_size),
            uid: None,
            callsign: String::new(),
        }
    }

    /// Get the peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Uid the client identified itself with (if any traffic was seen yet).
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    pub fn set_uid(&mut self, uid: impl Into<String>) {
        self.uid = Some(uid.into());
    }

    pub fn callsign(&self) -> &str {
        &self.callsign
    }

    pub fn set_callsign(&mut self, callsign: impl Into<String>) {
        self.callsign = callsign.into();
    }

    /// Read the next raw event document from the client.
    ///
    /// Returns `Ok(None)` if the connection is closed gracefully. Cancel-safe:
    /// partially received data stays buffered for the next call.
    pub async fn read_message(&mut self) -> Result<Option<Bytes>, ConnectionError> {
        loop {
            if let Some(frame) = self.framer.next_frame()? {
                return Ok(Some(frame));
            }

            let n = self.stream.read_buf(self.framer.buffer_mut()).await?;
            if n == 0 {
                if !self.framer.is_idle() {
                    return Err(ConnectionError::Truncated);
                }
                return Ok(None);
            }
        }
    }

    /// Send raw bytes to the client.
    pub async fn send_message(&mut self, msg: &[u8]) -> Result<(), ConnectionError> {
        self.stream.write_all(msg).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Shutdown the connection.
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Connection error types. All of them end the connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] CotError),

    #[error("Connection closed mid-document")]
    Truncated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair(max_message_size: usize) -> (ClientConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (ClientConnection::new(server, peer, 7, max_message_size), client)
    }

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::Io(std::io::Error::other("test"));
        assert!(err.to_string().contains("I/O"));

        let err = ConnectionError::Protocol(CotError::Framing("invalid".into()));
        assert!(err.to_string().contains("Protocol"));
    }

    #[tokio::test]
    async fn test_read_documents_then_eof() {
        let (mut conn, mut client) = pair(4096).await;
        assert_eq!(conn.session(), 7);
        assert!(conn.uid().is_none());

        client
            .write_all(br#"<event uid="a" type="t-x-c-t"/><event uid="b" type="t-x-c-t"></event>"#)
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let first = conn.read_message().await.unwrap().unwrap();
        assert!(first.starts_with(br#"<event uid="a""#));
        let second = conn.read_message().await.unwrap().unwrap();
        assert!(second.ends_with(b"</event>"));
        assert!(conn.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_is_fatal() {
        let (mut conn, mut client) = pair(4096).await;
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        assert!(matches!(
            conn.read_message().await,
            Err(ConnectionError::Protocol(CotError::Framing(_)))
        ));
    }

    #[tokio::test]
    async fn test_truncated_document() {
        let (mut conn, mut client) = pair(4096).await;
        client.write_all(br#"<event uid="a" type="a-f-G">"#).await.unwrap();
        client.shutdown().await.unwrap();

        assert!(matches!(
            conn.read_message().await,
            Err(ConnectionError::Truncated)
        ));
    }

    #[tokio::test]
    async fn test_send_message() {
        let (mut conn, mut client) = pair(4096).await;
        conn.send_message(b"<event/>").await.unwrap();
        conn.shutdown().await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"<event/>");
    }
}
