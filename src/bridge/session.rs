//! Per-connection session task.
//!
//! One task per accepted client. It owns the [`Bridge`] and feeds it events
//! from three sources, all funnelled through a single channel so handlers
//! for one connection never run concurrently:
//!
//! ```text
//! hyper server conn ── service_fn ──▶ Request / Malformed ─┐
//! dial task ───────────────────────▶ Dialed ───────────────┼──▶ mpsc ──▶ Bridge
//! backend pump ────────────────────▶ Backend(..) ──────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time;
use tracing::Instrument;

use crate::bridge::channel::{BackendEvent, BackendHandle, ClientHandle};
use crate::bridge::dial::dial_and_report;
use crate::bridge::{Bridge, BridgeSettings};
use crate::config::ProxyConfig;
use crate::error::{BridgeError, DialError, Peer};
use crate::http::headers::RequestMutator;
use crate::http::message::{aggregate_request, ProxyRequest, ProxyResponse};
use crate::load_balancer::LoadBalancer;
use crate::net::ConnectionId;
use crate::observability::AccessRecorder;

/// Everything that can happen to a session.
#[derive(Debug)]
pub enum SessionEvent {
    /// The client sent a complete request; `respond` carries its response.
    Request {
        request: ProxyRequest,
        respond: oneshot::Sender<ProxyResponse>,
    },
    /// The client sent something that could not be aggregated.
    Malformed(BridgeError),
    /// The backend dial finished.
    Dialed(Result<BackendHandle, DialError>),
    Backend(BackendEvent),
}

/// Per-session settings, built once at startup.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub bridge: Arc<BridgeSettings>,
    pub connect_timeout: Duration,
    pub max_body_bytes: usize,
    pub shutdown_grace: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            bridge: Arc::new(BridgeSettings {
                max_buffered_messages: config.bridge.max_buffered_messages,
                mutator: RequestMutator::from_config(config.bridge.trace_header.as_deref()),
                recorder: AccessRecorder::new(config.observability.access_log),
            }),
            connect_timeout: Duration::from_millis(config.timeouts.connect_ms),
            max_body_bytes: config.bridge.max_body_bytes,
            shutdown_grace: Duration::from_millis(config.timeouts.shutdown_grace_ms),
        }
    }
}

type HyperBridge = Bridge<BackendHandle, ClientHandle>;

/// Bridge one accepted client connection until either side is done.
pub async fn run_session(
    stream: TcpStream,
    client_addr: SocketAddr,
    id: ConnectionId,
    balancer: Arc<LoadBalancer>,
    settings: Arc<SessionSettings>,
    shutdown: broadcast::Receiver<()>,
) {
    let span = tracing::info_span!("session", connection_id = %id, client = %client_addr);
    drive(stream, client_addr, id, balancer, settings, shutdown)
        .instrument(span)
        .await
}

async fn drive(
    stream: TcpStream,
    client_addr: SocketAddr,
    id: ConnectionId,
    balancer: Arc<LoadBalancer>,
    settings: Arc<SessionSettings>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut bridge: HyperBridge = Bridge::new(
        id,
        client_addr,
        ClientHandle::new(),
        balancer,
        Arc::clone(&settings.bridge),
    );

    let endpoint = bridge.on_client_connect();
    let dial = tokio::spawn(
        dial_and_report(
            endpoint,
            settings.connect_timeout,
            settings.max_body_bytes,
            events_tx.clone(),
        )
        .in_current_span(),
    );

    let max_body_bytes = settings.max_body_bytes;
    let service = service_fn(move |request: Request<Incoming>| {
        let events = events_tx.clone();
        async move {
            let request = match aggregate_request(request, max_body_bytes).await {
                Ok(request) => request,
                Err(e) => {
                    let _ = events.send(SessionEvent::Malformed(e));
                    return Err(BridgeError::protocol(Peer::Client, "request rejected"));
                }
            };
            let (respond, response) = oneshot::channel();
            events
                .send(SessionEvent::Request { request, respond })
                .map_err(|_| BridgeError::PeerClosed(Peer::Client))?;
            // A dropped responder means the bridge closed this connection.
            response
                .await
                .map_err(|_| BridgeError::PeerClosed(Peer::Client))
        }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut client_done = false;
    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(error = %e, "Client connection ended with error");
                }
                client_done = true;
                break;
            }
            Some(event) = events.recv() => {
                dispatch(&mut bridge, event);
                if bridge.state().is_closing() {
                    break;
                }
            }
            _ = shutdown.recv(), if !draining => {
                tracing::debug!("Draining connection for shutdown");
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }

    dial.abort();

    if !client_done {
        // Let hyper flush a response already handed over before closing.
        conn.as_mut().graceful_shutdown();
        match time::timeout(settings.shutdown_grace, conn.as_mut()).await {
            Ok(Err(e)) => tracing::debug!(error = %e, "Client connection ended with error"),
            Ok(Ok(())) => {}
            Err(_) => tracing::debug!("Client connection did not close in time"),
        }
    }

    bridge.on_client_disconnect();
}

fn dispatch(bridge: &mut HyperBridge, event: SessionEvent) {
    match event {
        SessionEvent::Request { request, respond } => {
            bridge.client_mut().push(respond);
            bridge.on_client_message(request);
        }
        SessionEvent::Malformed(err) => bridge.on_protocol_error(err),
        SessionEvent::Dialed(Ok(channel)) => bridge.on_backend_dial_success(channel),
        SessionEvent::Dialed(Err(err)) => bridge.on_backend_dial_failure(err),
        SessionEvent::Backend(BackendEvent::Message(response)) => bridge.on_backend_message(response),
        SessionEvent::Backend(BackendEvent::Failed(err)) => bridge.on_backend_error(err),
        SessionEvent::Backend(BackendEvent::Closed) => bridge.on_backend_disconnect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let mut config = ProxyConfig::default();
        config.timeouts.connect_ms = 250;
        config.bridge.max_buffered_messages = 8;
        config.bridge.trace_header = Some("x-trace-id".into());
        config.observability.access_log = false;

        let settings = SessionSettings::from_config(&config);
        assert_eq!(settings.connect_timeout, Duration::from_millis(250));
        assert_eq!(settings.bridge.max_buffered_messages, 8);
        assert!(settings.bridge.mutator.trace_header().is_some());
        assert!(!settings.bridge.recorder.is_enabled());
    }
}
