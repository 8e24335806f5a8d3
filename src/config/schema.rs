//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Backend servers, in round-robin order.
    pub backends: Vec<BackendConfig>,

    /// Failure-counter health policy.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-connection bridge settings.
    pub bridge: BridgeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Hostname or IP address.
    pub host: String,

    /// TCP port.
    pub port: u16,
}

impl BackendConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Parses `host:port`; IPv6 hosts keep their brackets (`[::1]:8080`).
impl FromStr for BackendConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got {s:?}"))?;
        if host.is_empty() {
            return Err(format!("missing host in {s:?}"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in {s:?}: {e}"))?;
        Ok(Self::new(host, port))
    }
}

/// Health policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Number of consecutive failures before a backend is excluded.
    pub failure_threshold: u32,

    /// Time after the last failure at which an excluded backend may be
    /// re-admitted. Only consulted when `passive_recovery` is enabled.
    pub recovery_time_ms: u64,

    /// Re-admit excluded backends once `recovery_time_ms` has elapsed.
    pub passive_recovery: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_time_ms: 30_000,
            passive_recovery: false,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend dial (TCP connect + handshake) timeout in milliseconds.
    pub connect_ms: u64,

    /// How long shutdown waits for live connections to drain, in milliseconds.
    pub shutdown_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            shutdown_grace_ms: 10_000,
        }
    }
}

/// Connection bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum number of client messages held while the backend dial is in
    /// flight. Exceeding it closes the connection.
    pub max_buffered_messages: usize,

    /// Maximum aggregated body size in bytes, for requests and responses.
    pub max_body_bytes: usize,

    /// Optional header carrying the connection id on forwarded requests.
    pub trace_header: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_buffered_messages: 64,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            trace_header: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON instead of the human-readable format.
    pub json: bool,

    /// Emit one access line per completed request.
    pub access_log: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            access_log: true,
        }
    }
}
