//! Connection-level error taxonomy.
//!
//! Every variant is local to one client connection. The only effect that
//! crosses connections is the load balancer failure count, applied when
//! [`BridgeError::blames_backend`] is true.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Which side of a bridged connection an error concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Client,
    Backend,
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Client => f.write_str("client"),
            Peer::Backend => f.write_str("backend"),
        }
    }
}

/// Failure to establish the backend connection.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("HTTP handshake failed: {0}")]
    Handshake(#[source] hyper::Error),
}

/// Errors raised while bridging one client connection to its backend.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("backend dial failed: {0}")]
    Dial(#[from] DialError),
    #[error("write to closed {0} connection")]
    PeerClosed(Peer),
    #[error("backend exchange failed: {0}")]
    Exchange(#[source] hyper::Error),
    #[error("malformed message from {peer}: {reason}")]
    Protocol { peer: Peer, reason: String },
    #[error("pre-connect buffer full ({capacity} messages)")]
    BufferOverflow { capacity: usize },
}

impl BridgeError {
    pub fn protocol(peer: Peer, reason: impl Into<String>) -> Self {
        BridgeError::Protocol {
            peer,
            reason: reason.into(),
        }
    }

    /// Whether the error counts as a backend failure for load balancing.
    pub fn blames_backend(&self) -> bool {
        match self {
            BridgeError::Dial(_) | BridgeError::Exchange(_) => true,
            BridgeError::PeerClosed(peer) | BridgeError::Protocol { peer, .. } => {
                *peer == Peer::Backend
            }
            BridgeError::BufferOverflow { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blame_assignment() {
        assert!(BridgeError::PeerClosed(Peer::Backend).blames_backend());
        assert!(!BridgeError::PeerClosed(Peer::Client).blames_backend());
        assert!(BridgeError::protocol(Peer::Backend, "bad status").blames_backend());
        assert!(!BridgeError::protocol(Peer::Client, "body too large").blames_backend());
        assert!(!BridgeError::BufferOverflow { capacity: 4 }.blames_backend());
        assert!(BridgeError::from(DialError::Timeout(Duration::from_secs(1))).blames_backend());
    }

    #[test]
    fn display() {
        assert_eq!(
            BridgeError::PeerClosed(Peer::Client).to_string(),
            "write to closed client connection"
        );
        assert_eq!(
            BridgeError::protocol(Peer::Client, "length limit exceeded").to_string(),
            "malformed message from client: length limit exceeded"
        );
    }
}
