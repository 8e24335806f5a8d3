//! Backend registry and selection.
//!
//! # Responsibilities
//! - Hold the fixed, ordered set of backends
//! - Select the next backend round-robin, skipping excluded ones
//! - Record failures and successes reported by connection bridges

use thiserror::Error;

use crate::config::{BackendConfig, HealthCheckConfig};
use crate::health::PassivePolicy;
use crate::load_balancer::{
    backend::{Backend, BackendEndpoint},
    round_robin::RoundRobinCursor,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadBalancerError {
    #[error("no backends configured")]
    NoBackends,
}

/// Round-robin, failure-aware load balancer.
///
/// Shared by every connection; all state is atomic so selection and
/// reporting never take a lock.
#[derive(Debug)]
pub struct LoadBalancer {
    backends: Vec<Backend>,
    cursor: RoundRobinCursor,
    policy: PassivePolicy,
}

impl LoadBalancer {
    /// Create a load balancer over `endpoints`, in rotation order.
    pub fn new(
        endpoints: Vec<BackendEndpoint>,
        policy: PassivePolicy,
    ) -> Result<Self, LoadBalancerError> {
        if endpoints.is_empty() {
            return Err(LoadBalancerError::NoBackends);
        }
        Ok(Self {
            backends: endpoints.into_iter().map(Backend::new).collect(),
            cursor: RoundRobinCursor::new(),
            policy,
        })
    }

    /// Create a load balancer from configuration.
    pub fn from_config(
        backends: &[BackendConfig],
        health: &HealthCheckConfig,
    ) -> Result<Self, LoadBalancerError> {
        Self::new(
            backends.iter().map(BackendEndpoint::from).collect(),
            PassivePolicy::from_config(health),
        )
    }

    /// Select the next backend.
    ///
    /// Takes the endpoint under the cursor. When it is excluded the cursor
    /// keeps advancing until it lands on an eligible one, so every skipped
    /// turn is spread over the healthy backends instead of falling to the
    /// excluded backend's neighbour. When every backend is excluded, the raw
    /// round-robin candidate is returned anyway.
    pub fn select_next(&self) -> BackendEndpoint {
        let len = self.backends.len();
        let candidate = &self.backends[self.cursor.next_index(len)];
        if !self.policy.is_excluded(&candidate.health) {
            return candidate.endpoint.clone();
        }

        if self.backends.iter().any(|b| !self.policy.is_excluded(&b.health)) {
            // Bounded: health may change under concurrent reporters.
            for _ in 1..len {
                let backend = &self.backends[self.cursor.next_index(len)];
                if !self.policy.is_excluded(&backend.health) {
                    return backend.endpoint.clone();
                }
            }
        }

        tracing::warn!(
            backend = %candidate.endpoint,
            "All backends excluded, falling back to round-robin candidate"
        );
        candidate.endpoint.clone()
    }

    /// Count a failure against `endpoint`.
    pub fn record_failure(&self, endpoint: &BackendEndpoint) {
        let Some(backend) = self.find(endpoint) else {
            tracing::warn!(backend = %endpoint, "Failure reported for unknown backend");
            return;
        };
        let failures = backend.health.record_failure(self.policy.now_ms());
        if failures == self.policy.failure_threshold() {
            tracing::warn!(
                backend = %endpoint,
                failures,
                "Backend excluded from rotation"
            );
        } else {
            tracing::debug!(backend = %endpoint, failures, "Backend failure recorded");
        }
    }

    /// Reset the failure counter of `endpoint`, re-admitting it if excluded.
    pub fn record_success(&self, endpoint: &BackendEndpoint) {
        let Some(backend) = self.find(endpoint) else {
            tracing::warn!(backend = %endpoint, "Success reported for unknown backend");
            return;
        };
        let cleared = backend.health.record_success();
        if cleared >= self.policy.failure_threshold() {
            tracing::info!(backend = %endpoint, "Backend re-admitted to rotation");
        }
    }

    /// Number of configured backends.
    pub fn server_count(&self) -> usize {
        self.backends.len()
    }

    /// Whether `endpoint` is currently skipped by selection.
    pub fn is_excluded(&self, endpoint: &BackendEndpoint) -> bool {
        self.find(endpoint)
            .map(|b| self.policy.is_excluded(&b.health))
            .unwrap_or(false)
    }

    /// Consecutive failures currently counted against `endpoint`.
    pub fn failures(&self, endpoint: &BackendEndpoint) -> Option<u32> {
        self.find(endpoint).map(|b| b.health.failures())
    }

    /// The configured endpoints, in rotation order.
    pub fn endpoints(&self) -> impl Iterator<Item = &BackendEndpoint> {
        self.backends.iter().map(|b| &b.endpoint)
    }

    fn find(&self, endpoint: &BackendEndpoint) -> Option<&Backend> {
        self.backends.iter().find(|b| &b.endpoint == endpoint)
    }
}
