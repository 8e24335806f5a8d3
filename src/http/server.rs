//! Proxy server: accept loop and session hand-off.
//!
//! # Responsibilities
//! - Accept client connections through the bounded [`Listener`]
//! - Spawn one bridge session per connection
//! - Stop accepting on shutdown, then drain live sessions within the grace period

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::bridge::session::{run_session, SessionSettings};
use crate::config::ProxyConfig;
use crate::load_balancer::{LoadBalancer, LoadBalancerError};
use crate::net::{ConnectionTracker, Listener, ListenerError};

/// The reverse proxy.
pub struct ProxyServer {
    balancer: Arc<LoadBalancer>,
    settings: Arc<SessionSettings>,
    tracker: ConnectionTracker,
    shutdown_grace: Duration,
}

impl ProxyServer {
    /// Create a proxy for the configured backends.
    pub fn new(config: &ProxyConfig) -> Result<Self, LoadBalancerError> {
        let balancer = Arc::new(LoadBalancer::from_config(
            &config.backends,
            &config.health_check,
        )?);
        let settings = SessionSettings::from_config(config);
        Ok(Self {
            balancer,
            shutdown_grace: settings.shutdown_grace,
            settings: Arc::new(settings),
            tracker: ConnectionTracker::new(),
        })
    }

    /// Shared load balancer, for inspection.
    pub fn balancer(&self) -> Arc<LoadBalancer> {
        Arc::clone(&self.balancer)
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Serve until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(
            address = %addr,
            backends = self.balancer.server_count(),
            "Proxy server starting"
        );

        // Sessions subscribe to their own copy of the shutdown signal.
        let (drain_tx, _) = broadcast::channel::<()>(1);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping accept loop");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, client_addr, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
                    }

                    let guard = self.tracker.track();
                    let balancer = Arc::clone(&self.balancer);
                    let settings = Arc::clone(&self.settings);
                    let drain = drain_tx.subscribe();
                    tokio::spawn(async move {
                        let _permit = permit;
                        run_session(stream, client_addr, guard.id(), balancer, settings, drain).await;
                        drop(guard);
                    });
                }
            }
        }

        let _ = drain_tx.send(());
        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active, grace = ?self.shutdown_grace, "Draining connections");
            if tokio::time::timeout(self.shutdown_grace, self.tracker.wait_idle())
                .await
                .is_err()
            {
                tracing::warn!(
                    remaining = self.tracker.active_count(),
                    "Grace period elapsed with connections still open"
                );
            }
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use tokio::net::TcpListener;

    #[test]
    fn new_requires_backends() {
        let config = ProxyConfig::default();
        assert!(matches!(
            ProxyServer::new(&config),
            Err(LoadBalancerError::NoBackends)
        ));
    }

    #[tokio::test]
    async fn run_returns_after_shutdown() {
        let mut config = ProxyConfig::default();
        config.backends.push(BackendConfig::new("127.0.0.1", 9));
        let server = ProxyServer::new(&config).unwrap();
        assert_eq!(server.balancer().server_count(), 1);

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listener = Listener::from_tcp(tcp, 8).unwrap();
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(server.run(listener, rx));

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
