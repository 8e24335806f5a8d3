//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Derive the default filter from configuration
//! - Let `RUST_LOG` override everything
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Access lines get their own layer that prints the line and nothing else
//! - All output goes through one non-blocking stdout writer, so no session
//!   task ever waits on the terminal or a pipe

use std::fmt::{self, Write as _};
use std::io;

use tracing::{Event, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::{FmtContext, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ObservabilityConfig;
use crate::observability::access::ACCESS_TARGET;

/// Keeps the background log writer alive. Dropping it flushes pending lines.
#[must_use = "dropping the guard stops the log writer"]
pub struct LogGuard {
    _writer: WorkerGuard,
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_directives(config: &ObservabilityConfig) -> String {
    let access = if config.access_log { "info" } else { "off" };
    format!("bridge_proxy={},{}={}", config.log_level, ACCESS_TARGET, access)
}

fn is_access(meta: &Metadata<'_>) -> bool {
    meta.target() == ACCESS_TARGET
}

fn is_application(meta: &Metadata<'_>) -> bool {
    !is_access(meta)
}

/// Formats an access event as its message alone: no timestamp, level,
/// target or span prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLine;

impl<S, N> FormatEvent<S, N> for AccessLine
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Layer that writes access lines, and only access lines, to `writer`.
pub fn access_layer<S, W>(writer: W) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(AccessLine)
        .with_writer(writer)
        .with_filter(filter_fn(is_access))
}

/// Install the global subscriber.
pub fn init(config: &ObservabilityConfig) -> Result<LogGuard, TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directives(config).into());

    let (writer, guard) = tracing_appender::non_blocking(io::stdout());

    let json = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer.clone())
            .with_filter(filter_fn(is_application))
    });
    let plain = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer.clone())
            .with_filter(filter_fn(is_application))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .with(access_layer(writer))
        .try_init()?;

    Ok(LogGuard { _writer: guard })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_follow_config() {
        let mut config = ObservabilityConfig::default();
        assert_eq!(default_directives(&config), "bridge_proxy=info,access=info");

        config.log_level = "debug".into();
        config.access_log = false;
        assert_eq!(default_directives(&config), "bridge_proxy=debug,access=off");
    }

    #[test]
    fn access_layer_prints_bare_lines() {
        let lines = capture::access_lines(|| {
            let _span = tracing::info_span!("session", connection_id = "conn-1").entered();
            tracing::info!(target: ACCESS_TARGET, "2026-01-02 03:04:05.678 | GET / | 200");
            tracing::info!("not an access line");
            tracing::warn!(target: "bridge_proxy::bridge", "also not");
        });
        assert_eq!(lines, vec!["2026-01-02 03:04:05.678 | GET / | 200"]);
    }
}
