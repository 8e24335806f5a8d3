//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Client connection accepted
//!     → pool.rs LoadBalancer::select_next
//!         - round_robin.rs (advance shared cursor)
//!         - skip backends the health policy excludes
//!         - fall back to the raw candidate if all are excluded
//!     → Bridge dials the returned backend.rs endpoint
//!     → Bridge reports record_success / record_failure
//! ```
//!
//! # Design Decisions
//! - Pure selection logic, no I/O
//! - Backend set is fixed at construction
//! - Lock-free: one atomic cursor, independent atomic counters per backend

pub mod backend;
pub mod pool;
pub mod round_robin;

pub use backend::{Backend, BackendEndpoint};
pub use pool::{LoadBalancer, LoadBalancerError};
pub use round_robin::RoundRobinCursor;
