// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cursor-on-Target relay server
//!
//! # Usage
//!
//! ```bash
//! # Start on default ports (TCP 8089, UDP 4242, admin 8080)
//! cot-relay
//!
//! # Custom ports, no admin API
//! cot-relay --tcp-port 8087 --udp-port 6969 --no-admin
//!
//! # Dump every event to <type>.log files
//! cot-relay --logging --dump-dir /var/log/cot
//! ```

use clap::Parser;
use cot_relay::{RelayConfig, RelayServer};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Cursor-on-Target relay - routes tactical events between TAK clients
#[derive(Parser, Debug)]
#[command(name = "cot-relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port for streaming clients
    #[arg(long, default_value = "8089")]
    tcp_port: u16,

    /// UDP port for datagram senders
    #[arg(long, default_value = "4242")]
    udp_port: u16,

    /// HTTP port of the admin API
    #[arg(long, default_value = "8080")]
    admin_port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Configuration file (JSON format), replaces the flags above
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Append every event to <dump-dir>/<type>.log
    #[arg(long)]
    logging: bool,

    /// Directory for event dumps
    #[arg(long, default_value = ".")]
    dump_dir: PathBuf,

    /// Disable the admin API
    #[arg(long)]
    no_admin: bool,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    // Load or create config
    let config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        RelayConfig::from_file(&config_path)?
    } else {
        RelayConfig {
            bind_address: args.bind,
            tcp_port: args.tcp_port,
            udp_port: args.udp_port,
            admin_port: args.admin_port,
            admin_enabled: !args.no_admin,
            dump_events: args.logging,
            dump_dir: args.dump_dir,
            ..Default::default()
        }
    };

    info!("+----------------------------------------------------+");
    info!(
        "|       CoT Relay v{}                             |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  TCP:    {:40} |", config.tcp_addr());
    info!("|  UDP:    {:40} |", config.udp_addr());
    info!(
        "|  Admin:  {:40} |",
        if config.admin_enabled {
            config.admin_addr().to_string()
        } else {
            "disabled".to_string()
        }
    );
    info!(
        "|  Dump:   {:40} |",
        if config.dump_events {
            config.dump_dir.display().to_string()
        } else {
            "disabled".to_string()
        }
    );
    info!("+----------------------------------------------------+");

    // Bind every listener before serving
    let server = RelayServer::bind(config).await?;

    // Handle shutdown signals
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping relay...");
        shutdown.cancel();
    });

    server.run().await?;

    Ok(())
}
