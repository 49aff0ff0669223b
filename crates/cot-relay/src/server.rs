// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay server core.
//!
//! [`RelayServer::bind`] opens every listener up front so a port conflict
//! fails startup immediately. [`RelayServer::run`] then spawns the processor,
//! the datagram listener and the admin API, and accepts stream clients until
//! the shutdown token fires.

use crate::admin::{self, AdminState};
use crate::config::{ConfigError, RelayConfig};
use crate::cot::{self, CotMessage};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

pub mod clients;
pub mod connection;
pub mod datagram;
pub mod processor;
pub mod queue;
pub mod router;
pub mod units;

pub use clients::{ClientHandle, ClientInfo, ClientRegistry, SessionId};
pub use connection::{ClientConnection, ConnectionError};
pub use datagram::DatagramListener;
pub use processor::{Dispatch, EventDump, EventProcessor};
pub use queue::{inbound_queue, EventReceiver, EventSender, QueueError};
pub use router::{Router, RouterStats, RouterStatsSnapshot};
pub use units::{Unit, UnitRegistry};

/// Relay server with all listeners bound.
pub struct RelayServer {
    config: Arc<RelayConfig>,
    tcp: TcpListener,
    udp: UdpSocket,
    admin: Option<TcpListener>,
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
    admin_addr: Option<SocketAddr>,
    clients: Arc<ClientRegistry>,
    units: Arc<UnitRegistry>,
    router: Router,
    cancel: CancellationToken,
}

impl RelayServer {
    /// Validate the configuration and bind every listener.
    pub async fn bind(config: RelayConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let tcp = TcpListener::bind(config.tcp_addr())
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.tcp_addr(),
                source,
            })?;
        let tcp_addr = tcp.local_addr()?;
        info!("TCP listener bound on {}", tcp_addr);

        let udp = UdpSocket::bind(config.udp_addr())
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.udp_addr(),
                source,
            })?;
        let udp_addr = udp.local_addr()?;
        info!("UDP listener bound on {}", udp_addr);

        let admin = if config.admin_enabled {
            let listener = TcpListener::bind(config.admin_addr())
                .await
                .map_err(|source| ServerError::Bind {
                    addr: config.admin_addr(),
                    source,
                })?;
            info!("Admin API bound on {}", listener.local_addr()?);
            Some(listener)
        } else {
            None
        };
        let admin_addr = admin.as_ref().map(TcpListener::local_addr).transpose()?;

        let clients = Arc::new(ClientRegistry::new());
        let units = Arc::new(UnitRegistry::new());
        let router = Router::new(clients.clone());

        Ok(Self {
            config: Arc::new(config),
            tcp,
            udp,
            admin,
            tcp_addr,
            udp_addr,
            admin_addr,
            clients,
            units,
            router,
            cancel: CancellationToken::new(),
        })
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    /// Admin API address, `None` when the admin API is disabled.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn clients(&self) -> Arc<ClientRegistry> {
        self.clients.clone()
    }

    pub fn units(&self) -> Arc<UnitRegistry> {
        self.units.clone()
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal the server to shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run until shutdown, then wait for every task to finish.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self {
            config,
            tcp,
            udp,
            admin,
            clients,
            units,
            router,
            cancel,
            ..
        } = self;

        let tracker = TaskTracker::new();
        let (queue, queue_rx) = inbound_queue(config.queue_capacity);

        let mut processor = EventProcessor::new(queue_rx, units.clone(), router.clone());
        if config.dump_events {
            info!("Dumping events to {}", config.dump_dir.display());
            processor = processor.with_dump(EventDump::new(&config.dump_dir));
        }
        tracker.spawn(processor.run(cancel.clone()));

        tracker.spawn(DatagramListener::new(udp).run(queue.clone(), cancel.clone()));

        if let Some(listener) = admin {
            let state = Arc::new(AdminState::new(clients.clone(), units, router));
            let cancel = cancel.clone();
            tracker.spawn(async move {
                if let Err(e) = admin::serve(listener, state, cancel).await {
                    error!("Admin API error: {}", e);
                }
            });
        }

        let mut next_session: SessionId = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                result = tcp.accept() => match result {
                    Ok((stream, peer_addr)) => {
                        info!("New connection from {}", peer_addr);
                        next_session += 1;

                        let session = next_session;
                        let clients = clients.clone();
                        let queue = queue.clone();
                        let config = config.clone();
                        let cancel = cancel.clone();

                        tracker.spawn(async move {
                            if let Err(e) = handle_connection(
                                stream,
                                peer_addr,
                                session,
                                clients,
                                queue,
                                config,
                                cancel,
                            )
                            .await
                            {
                                warn!("Connection error from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Accept error: {}", e),
                },
            }
        }

        drop(queue);
        tracker.close();
        tracker.wait().await;

        info!("Relay server stopped");
        Ok(())
    }
}

/// Time allowed to flush a client's pending egress on the way out.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Serve one stream client until it disconnects or the server shuts down.
///
/// The same task drains the client's egress queue onto the socket. Writes
/// race the shutdown token, so a peer that stops reading cannot hold up
/// shutdown.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    session: SessionId,
    clients: Arc<ClientRegistry>,
    queue: EventSender,
    config: Arc<RelayConfig>,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    let mut conn = ClientConnection::new(stream, peer_addr, session, config.max_message_size);
    let (tx, mut rx) = mpsc::channel::<Bytes>(config.egress_capacity);
    let mut flush = true;

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Connection handler shutting down: {}", peer_addr);
                break Ok(());
            }
            result = conn.read_message() => match result {
                Ok(Some(raw)) => {
                    if let Some(msg) = decode_frame(raw, peer_addr) {
                        learn_identity(&mut conn, &msg, &clients, &tx).await;
                        if queue.submit(msg, &cancel).await.is_err() {
                            break Ok(());
                        }
                    }
                }
                Ok(None) => {
                    info!("Connection closed: {}", peer_addr);
                    break Ok(());
                }
                Err(e) => break Err(e),
            },
            Some(outbound) = rx.recv() => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        // A document may be half written
                        flush = false;
                        break Ok(());
                    }
                    result = conn.send_message(&outbound) => {
                        if let Err(e) = result {
                            break Err(e);
                        }
                    }
                }
            }
        }
    };

    if let Some(uid) = conn.uid() {
        if clients.remove_session(uid, session).await {
            info!("Client removed: {} ({})", uid, peer_addr);
        }
    }

    if result.is_err() {
        flush = false;
    }
    let closing = async {
        if flush {
            while let Ok(outbound) = rx.try_recv() {
                conn.send_message(&outbound).await?;
            }
        }
        conn.shutdown().await
    };
    match tokio::time::timeout(FLUSH_TIMEOUT, closing).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Closing {} failed: {}", peer_addr, e),
        Err(_) => debug!("Closing {} timed out, dropping pending data", peer_addr),
    }

    result
}

fn decode_frame(raw: Bytes, peer_addr: SocketAddr) -> Option<CotMessage> {
    match cot::decode_message(raw) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Dropping malformed event from {}: {}", peer_addr, e);
            None
        }
    }
}

/// Learn who is on the other end of a stream connection.
///
/// The first event registers the client under its uid. Until an event with
/// a contact callsign arrives the identity is provisional (a ping sent as
/// `<device>-ping`, say); the first contact-bearing event then re-keys the
/// client under that event's uid. Once a callsign is known, only events
/// from the same uid update it.
async fn learn_identity(
    conn: &mut ClientConnection,
    msg: &CotMessage,
    clients: &ClientRegistry,
    tx: &mpsc::Sender<Bytes>,
) {
    let event = &msg.event;
    let callsign = event.callsign();

    let Some(uid) = conn.uid().map(str::to_owned) else {
        register(conn, clients, tx, &event.uid, callsign.unwrap_or_default()).await;
        return;
    };
    let Some(callsign) = callsign else {
        return;
    };

    if uid == event.uid {
        if callsign != conn.callsign() {
            conn.set_callsign(callsign);
            clients.set_callsign(&uid, conn.session(), callsign).await;
            info!("Client {} is now known as {}", uid, callsign);
        }
    } else if conn.callsign().is_empty() {
        clients.remove_session(&uid, conn.session()).await;
        info!("Client {} identified as {} [{}]", uid, event.uid, callsign);
        register(conn, clients, tx, &event.uid, callsign).await;
    }
}

async fn register(
    conn: &mut ClientConnection,
    clients: &ClientRegistry,
    tx: &mpsc::Sender<Bytes>,
    uid: &str,
    callsign: &str,
) {
    conn.set_uid(uid);
    conn.set_callsign(callsign);

    let handle =
        ClientHandle::new(conn.session(), conn.peer_addr(), tx.clone()).with_callsign(callsign);
    if clients.add(uid, handle).await.is_some() {
        info!(
            "Client {} reconnected from {}, replacing previous session",
            uid,
            conn.peer_addr()
        );
    } else {
        info!("Client added: {} [{}] from {}", uid, callsign, conn.peer_addr());
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bind error on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
