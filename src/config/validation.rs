//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, ports valid)
//! - Require at least one backend
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one backend must be configured")]
    NoBackends,
    #[error("backend #{index} has an empty host")]
    EmptyHost { index: usize },
    #[error("backend #{index} ({host}) has port 0")]
    ZeroPort { index: usize, host: String },
    #[error("invalid bind address {0:?}")]
    BindAddress(String),
    #[error("listener.max_connections must be greater than 0")]
    ZeroMaxConnections,
    #[error("health_check.failure_threshold must be greater than 0")]
    ZeroFailureThreshold,
    #[error("bridge.max_buffered_messages must be greater than 0")]
    ZeroBufferCapacity,
    #[error("trace header {0:?} is not a valid header name")]
    TraceHeader(String),
}

/// Check a parsed configuration, returning every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }
    for (index, backend) in config.backends.iter().enumerate() {
        if backend.host.trim().is_empty() {
            errors.push(ValidationError::EmptyHost { index });
        }
        if backend.port == 0 {
            errors.push(ValidationError::ZeroPort {
                index,
                host: backend.host.clone(),
            });
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if config.health_check.failure_threshold == 0 {
        errors.push(ValidationError::ZeroFailureThreshold);
    }
    if config.bridge.max_buffered_messages == 0 {
        errors.push(ValidationError::ZeroBufferCapacity);
    }
    if let Some(name) = &config.bridge.trace_header {
        if hyper::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::TraceHeader(name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackendConfig;

    fn valid() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.backends.push(BackendConfig::new("127.0.0.1", 8081));
        config
    }

    #[test]
    fn accepts_minimal_config() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.health_check.failure_threshold = 0;
        config.bridge.trace_header = Some("bad header".into());

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::NoBackends));
        assert!(errors.contains(&ValidationError::BindAddress("not-an-address".into())));
        assert!(errors.contains(&ValidationError::ZeroFailureThreshold));
        assert!(errors.contains(&ValidationError::TraceHeader("bad header".into())));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn rejects_bad_backend_entries() {
        let mut config = valid();
        config.backends.push(BackendConfig::new("", 8082));
        config.backends.push(BackendConfig::new("10.0.0.3", 0));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyHost { index: 1 },
                ValidationError::ZeroPort {
                    index: 2,
                    host: "10.0.0.3".into()
                },
            ]
        );
    }
}
