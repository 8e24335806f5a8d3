//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server identity (host, port)
//! - Pair each identity with its health counters

use std::fmt;

use crate::config::BackendConfig;
use crate::health::HealthState;

/// Immutable identity of one upstream server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendEndpoint {
    host: String,
    port: u16,
}

impl BackendEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, as used for dialing and for the rewritten `Host` header.
    pub fn authority(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BackendEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal.
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<&BackendConfig> for BackendEndpoint {
    fn from(config: &BackendConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }
}

/// A single backend server known to the load balancer.
#[derive(Debug)]
pub struct Backend {
    /// The identity of the backend.
    pub endpoint: BackendEndpoint,
    /// Consecutive-failure bookkeeping.
    pub health: HealthState,
}

impl Backend {
    pub fn new(endpoint: BackendEndpoint) -> Self {
        Self {
            endpoint,
            health: HealthState::new(),
        }
    }
}
