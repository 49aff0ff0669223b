// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cursor-on-Target relay
//!
//! Accepts CoT XML events from TAK-style clients over TCP (persistent
//! sessions) and UDP (fire-and-forget datagrams), tracks the units and points
//! they report, and routes each event onward:
//! - Pings (`t-x-c-t`) are answered with a pong to the sender only
//! - Events addressed with `<marti><dest callsign=.../></marti>` go to the
//!   named callsigns
//! - Everything else is broadcast to every client except its author
//!
//! # Example
//!
//! ```no_run
//! use cot_relay::{RelayConfig, RelayServer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let server = RelayServer::bind(RelayConfig::default()).await?;
//! let shutdown = server.shutdown_token();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     shutdown.cancel();
//! });
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod config;
pub mod cot;
pub mod server;

pub use config::{ConfigError, RelayConfig};
pub use cot::{CotError, CotMessage, Event, MessageKind};
pub use server::{RelayServer, ServerError};
