//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Bridge observes an outcome (dial, forward, backend exchange)
//!     → LoadBalancer::record_failure / record_success
//!     → state.rs (per-backend counters)
//!     → passive.rs decides exclusion at selection time
//! ```
//!
//! # Design Decisions
//! - Health is derived from real traffic only
//! - Health state is per-backend; no cross-backend locking

pub mod passive;
pub mod state;

pub use passive::PassivePolicy;
pub use state::HealthState;
