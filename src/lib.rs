//! HTTP/1.1 reverse proxy that bridges each client connection to one
//! backend chosen by a failure-aware round-robin load balancer.

pub mod bridge;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
