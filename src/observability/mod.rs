//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → access.rs (one line per completed exchange)
//!
//! Consumers:
//!     → stdout via tracing-subscriber (plain or JSON)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Connection id flows through every log line of a session
//! - Access recording never blocks the connection task

pub mod access;
pub mod logging;

pub use access::{AccessEntry, AccessRecorder};
