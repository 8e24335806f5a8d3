//! Connection bridge.
//!
//! # Data Flow
//! ```text
//! client accepted ── on_client_connect ──▶ LoadBalancer::select_next, dial spawned
//!     │                                         (Connecting)
//!     ├─ on_client_message ──▶ buffer while no backend, forward once bound
//!     ├─ on_backend_dial_success ──▶ drain buffer FIFO, record_success (Forwarding)
//!     ├─ on_backend_dial_failure ──▶ release buffer, record_failure, close client
//!     ├─ on_backend_message ──▶ client, then resume backend read
//!     ├─ on_backend_disconnect ──▶ close client (Closing)
//!     └─ on_client_disconnect ──▶ release buffer, close backend (Closed)
//! ```
//!
//! # Design Decisions
//! - The state machine does no I/O; it writes through [`BackendChannel`] and
//!   [`ClientSink`], which `session.rs` backs with hyper connections
//! - One fatal path: any error closes both sides and releases the buffer
//! - Closing is idempotent on both sides
//! - A backend channel is bound at most once; there is no re-homing

pub mod channel;
pub mod context;
pub mod dial;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{BridgeError, DialError};
use crate::http::headers::{strip_hop_by_hop, RequestMutator};
use crate::http::message::{ProxyRequest, ProxyResponse};
use crate::load_balancer::{BackendEndpoint, LoadBalancer};
use crate::net::ConnectionId;
use crate::observability::{AccessEntry, AccessRecorder};

pub use channel::{BackendChannel, ClientSink};
pub use context::{ConnectionContext, RequestMeta};

/// Lifecycle of a bridged connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Accepted, no backend chosen yet.
    Init,
    /// Backend chosen, dial in flight; client messages are buffered.
    Connecting,
    /// Backend bound; messages flow both ways.
    Forwarding,
    /// Both sides told to close; client teardown may still be flushing.
    Closing,
    /// Fully closed.
    Closed,
}

impl BridgeState {
    pub fn is_closing(self) -> bool {
        matches!(self, BridgeState::Closing | BridgeState::Closed)
    }
}

/// Settings shared by every bridge.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub max_buffered_messages: usize,
    pub mutator: RequestMutator,
    pub recorder: AccessRecorder,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            max_buffered_messages: 64,
            mutator: RequestMutator::default(),
            recorder: AccessRecorder::default(),
        }
    }
}

/// Pairs one client connection with one backend connection.
pub struct Bridge<C, S> {
    ctx: ConnectionContext<C>,
    client: S,
    balancer: Arc<LoadBalancer>,
    settings: Arc<BridgeSettings>,
    state: BridgeState,
}

impl<C: BackendChannel, S: ClientSink> Bridge<C, S> {
    pub fn new(
        id: ConnectionId,
        client_addr: SocketAddr,
        client: S,
        balancer: Arc<LoadBalancer>,
        settings: Arc<BridgeSettings>,
    ) -> Self {
        Self {
            ctx: ConnectionContext::new(id, client_addr),
            client,
            balancer,
            settings,
            state: BridgeState::Init,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn context(&self) -> &ConnectionContext<C> {
        &self.ctx
    }

    pub fn client(&self) -> &S {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut S {
        &mut self.client
    }

    /// Whether client messages are currently being held back.
    pub fn is_buffering(&self) -> bool {
        !self.state.is_closing() && self.ctx.backend().is_none() && self.ctx.buffered_len() > 0
    }

    /// Choose the backend for this connection. The caller starts the dial.
    pub fn on_client_connect(&mut self) -> BackendEndpoint {
        let endpoint = self.balancer.select_next();
        tracing::debug!(
            connection_id = %self.ctx.id(),
            client = %self.ctx.client_addr(),
            backend = %endpoint,
            "Backend selected"
        );
        self.ctx.set_endpoint(endpoint.clone());
        self.state = BridgeState::Connecting;
        endpoint
    }

    /// A complete request arrived from the client.
    pub fn on_client_message(&mut self, request: ProxyRequest) {
        if self.state.is_closing() {
            tracing::debug!(connection_id = %self.ctx.id(), "Dropping request on closing connection");
            return;
        }
        self.ctx.begin_request(&request);

        if self.ctx.backend().is_some() {
            if let Err(e) = self.forward(request) {
                self.fail(e);
            }
            return;
        }

        let capacity = self.settings.max_buffered_messages;
        if self.ctx.buffered_len() >= capacity {
            drop(request);
            self.fail(BridgeError::BufferOverflow { capacity });
            return;
        }
        self.ctx.buffer(request);
        tracing::trace!(
            connection_id = %self.ctx.id(),
            buffered = self.ctx.buffered_len(),
            "Request buffered until backend is ready"
        );
    }

    /// The dial finished and `channel` is ready.
    pub fn on_backend_dial_success(&mut self, mut channel: C) {
        if self.state.is_closing() {
            tracing::debug!(connection_id = %self.ctx.id(), "Discarding backend dialed after close");
            channel.close();
            return;
        }
        if let Err(mut duplicate) = self.ctx.bind_backend(channel) {
            tracing::warn!(connection_id = %self.ctx.id(), "Backend already bound, closing duplicate");
            duplicate.close();
            return;
        }

        let buffered = self.ctx.take_buffered();
        let flushed = buffered.len();
        for request in buffered {
            // On error the rest of `buffered` is dropped with the iterator.
            if let Err(e) = self.forward(request) {
                self.fail(e);
                return;
            }
        }

        self.state = BridgeState::Forwarding;
        if let Some(endpoint) = self.ctx.endpoint() {
            tracing::debug!(
                connection_id = %self.ctx.id(),
                backend = %endpoint,
                flushed,
                "Backend ready"
            );
            self.balancer.record_success(endpoint);
        }
    }

    /// The dial failed. Buffered requests are released, never forwarded.
    pub fn on_backend_dial_failure(&mut self, err: DialError) {
        let released = self.ctx.release_buffer();
        if let Some(endpoint) = self.ctx.endpoint() {
            tracing::warn!(
                connection_id = %self.ctx.id(),
                backend = %endpoint,
                error = %err,
                released,
                "Backend dial failed"
            );
            self.balancer.record_failure(endpoint);
        }
        self.client.close();
        if !self.state.is_closing() {
            self.state = BridgeState::Closing;
        }
    }

    /// The client connection is gone.
    pub fn on_client_disconnect(&mut self) {
        if self.state == BridgeState::Closed {
            return;
        }
        let released = self.ctx.release_buffer();
        if let Some(backend) = self.ctx.backend_mut() {
            backend.close();
        }
        self.client.close();
        self.state = BridgeState::Closed;
        tracing::debug!(
            connection_id = %self.ctx.id(),
            released,
            requests = self.ctx.requests_seen(),
            "Client disconnected"
        );
    }

    /// A complete response arrived from the backend.
    pub fn on_backend_message(&mut self, mut response: ProxyResponse) {
        if self.state.is_closing() {
            return;
        }
        strip_hop_by_hop(response.headers_mut());
        let status = response.status();
        self.ctx.set_status(status);
        let meta = self.ctx.finish_request();

        if let Err(e) = self.client.send(response) {
            self.fail(e);
            return;
        }

        if let (Some(meta), Some(endpoint)) = (meta, self.ctx.endpoint()) {
            self.settings.recorder.record(&AccessEntry {
                method: &meta.method,
                uri: &meta.uri,
                status,
                elapsed: meta.started_at.elapsed(),
                client: self.ctx.client_addr(),
                backend: endpoint,
            });
        }

        if let Some(backend) = self.ctx.backend_mut() {
            backend.resume_read();
        }
    }

    /// The backend closed its connection; the client follows.
    pub fn on_backend_disconnect(&mut self) {
        if self.state.is_closing() {
            return;
        }
        tracing::debug!(connection_id = %self.ctx.id(), "Backend disconnected");
        self.close_both();
    }

    /// A backend exchange failed.
    pub fn on_backend_error(&mut self, err: BridgeError) {
        self.fail(err);
    }

    /// The client sent something the codec could not turn into a message.
    pub fn on_protocol_error(&mut self, err: BridgeError) {
        self.fail(err);
    }

    fn forward(&mut self, mut request: ProxyRequest) -> Result<(), BridgeError> {
        let id = self.ctx.id().to_string();
        let client = self.ctx.client_addr();
        if let Some(endpoint) = self.ctx.endpoint() {
            self.settings.mutator.apply(&mut request, client, endpoint, &id);
        }
        match self.ctx.backend_mut() {
            Some(backend) => backend.forward(request),
            None => Err(BridgeError::PeerClosed(crate::error::Peer::Backend)),
        }
    }

    /// The single fatal path.
    fn fail(&mut self, err: BridgeError) {
        if self.state.is_closing() {
            return;
        }
        tracing::warn!(
            connection_id = %self.ctx.id(),
            backend = ?self.ctx.endpoint().map(ToString::to_string),
            error = %err,
            "Closing connection"
        );
        if err.blames_backend() {
            if let Some(endpoint) = self.ctx.endpoint() {
                self.balancer.record_failure(endpoint);
            }
        }
        self.close_both();
    }

    fn close_both(&mut self) {
        self.ctx.release_buffer();
        if let Some(backend) = self.ctx.backend_mut() {
            backend.close();
        }
        self.client.close();
        self.state = BridgeState::Closing;
    }
}
