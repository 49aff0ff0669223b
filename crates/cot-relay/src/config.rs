// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address to bind all listeners to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port for streaming clients (default: 8089)
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,

    /// UDP port for datagram senders (default: 4242)
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,

    /// HTTP port of the read-only admin API (default: 8080)
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,

    /// Serve the admin API
    #[serde(default = "default_true")]
    pub admin_enabled: bool,

    /// Capacity of the inbound event queue shared by all listeners
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of each client's outbound queue
    #[serde(default = "default_egress_capacity")]
    pub egress_capacity: usize,

    /// Maximum size of a single event document (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Append every event to `<dump_dir>/<type>.log`
    #[serde(default)]
    pub dump_events: bool,

    /// Directory for event dumps
    #[serde(default = "default_dump_dir")]
    pub dump_dir: PathBuf,
}

fn default_bind_address() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_tcp_port() -> u16 {
    8089
}

fn default_udp_port() -> u16 {
    4242
}

fn default_admin_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    20
}

fn default_egress_capacity() -> usize {
    100
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1 MB
}

fn default_dump_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            tcp_port: default_tcp_port(),
            udp_port: default_udp_port(),
            admin_port: default_admin_port(),
            admin_enabled: true,
            queue_capacity: default_queue_capacity(),
            egress_capacity: default_egress_capacity(),
            max_message_size: default_max_message_size(),
            dump_events: false,
            dump_dir: default_dump_dir(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.tcp_port)
    }

    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.udp_port)
    }

    pub fn admin_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.admin_port)
    }

    /// Validate configuration.
    ///
    /// Port 0 is accepted and means "any free port".
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "queue_capacity cannot be 0".into(),
            ));
        }
        if self.egress_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "egress_capacity cannot be 0".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_message_size cannot be 0".into(),
            ));
        }
        if self.max_message_size > 64 * 1024 * 1024 {
            return Err(ConfigError::InvalidValue(
                "max_message_size cannot exceed 64 MB".into(),
            ));
        }
        Ok(())
    }
}
