//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, one session per connection)
//!     → message.rs (aggregate request bodies into whole messages)
//!     → headers.rs (Host, X-Forwarded-For, trace header, hop-by-hop)
//!     → bridge (forward to the selected backend)
//!     → message.rs (aggregate the backend response)
//!     → Send to client
//! ```

pub mod headers;
pub mod message;
pub mod server;

pub use headers::{RequestMutator, X_FORWARDED_FOR};
pub use message::{ProxyRequest, ProxyResponse};
pub use server::ProxyServer;
