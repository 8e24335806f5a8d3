//! Access recording.
//!
//! One line per completed request/response exchange:
//!
//! ```text
//! 2026-01-02 03:04:05.678 | GET /index.html | 200 | 1.25ms | 10.0.0.9:51544 -> 127.0.0.1:8081
//! ```
//!
//! Lines go to the `access` tracing target. Formatting is a handful of
//! `Display` calls so it runs inline on the connection task; the write
//! itself is handed to the non-blocking writer set up in `logging.rs`.

use std::net::SocketAddr;
use std::time::Duration;

use hyper::{Method, StatusCode, Uri};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::load_balancer::BackendEndpoint;

/// Tracing target carrying access lines.
pub const ACCESS_TARGET: &str = "access";

/// The facts recorded for one completed exchange.
#[derive(Debug, Clone)]
pub struct AccessEntry<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub status: StatusCode,
    pub elapsed: Duration,
    pub client: SocketAddr,
    pub backend: &'a BackendEndpoint,
}

/// Emits access lines when enabled.
#[derive(Debug, Clone)]
pub struct AccessRecorder {
    enabled: bool,
}

impl AccessRecorder {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record one completed exchange.
    pub fn record(&self, entry: &AccessEntry<'_>) {
        if !self.enabled {
            return;
        }
        let line = format_line(OffsetDateTime::now_utc(), entry);
        tracing::info!(target: ACCESS_TARGET, "{line}");
    }
}

impl Default for AccessRecorder {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Nanosecond-precision duration rendered as milliseconds, two decimals.
pub fn duration_ms(elapsed: Duration) -> String {
    format!("{:.2}", elapsed.as_nanos() as f64 / 1_000_000.0)
}

fn timestamp(at: OffsetDateTime) -> String {
    let format = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    );
    at.format(&format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// `timestamp | METHOD URI | STATUS | duration_ms | client -> backend`
pub fn format_line(at: OffsetDateTime, entry: &AccessEntry<'_>) -> String {
    format!(
        "{} | {} {} | {} | {}ms | {} -> {}",
        timestamp(at),
        entry.method,
        entry.uri,
        entry.status.as_u16(),
        duration_ms(entry.elapsed),
        entry.client,
        entry.backend,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn milliseconds_with_two_decimals() {
        assert_eq!(duration_ms(Duration::from_nanos(1_234_567)), "1.23");
        assert_eq!(duration_ms(Duration::from_micros(6)), "0.01");
        assert_eq!(duration_ms(Duration::ZERO), "0.00");
        assert_eq!(duration_ms(Duration::from_secs(2)), "2000.00");
    }

    #[test]
    fn line_layout() {
        let method = Method::POST;
        let uri: Uri = "/orders?id=7".parse().unwrap();
        let backend = BackendEndpoint::new("127.0.0.1", 8081);
        let entry = AccessEntry {
            method: &method,
            uri: &uri,
            status: StatusCode::CREATED,
            elapsed: Duration::from_micros(12_346),
            client: "10.0.0.9:51544".parse().unwrap(),
            backend: &backend,
        };

        let line = format_line(datetime!(2026-01-02 03:04:05.678 UTC), &entry);
        assert_eq!(
            line,
            "2026-01-02 03:04:05.678 | POST /orders?id=7 | 201 | 12.35ms | 10.0.0.9:51544 -> 127.0.0.1:8081"
        );
    }
}
