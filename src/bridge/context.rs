//! Per-connection state.
//!
//! Everything here is owned by a single session task; nothing is shared
//! across connections.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

use hyper::{Method, StatusCode, Uri};

use crate::http::message::ProxyRequest;
use crate::load_balancer::BackendEndpoint;
use crate::net::ConnectionId;

/// Method, target and start instant of a request awaiting its response.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: Method,
    pub uri: Uri,
    pub started_at: Instant,
}

/// State of one client connection and its (eventual) backend connection.
#[derive(Debug)]
pub struct ConnectionContext<C> {
    id: ConnectionId,
    created_at: Instant,
    client_addr: SocketAddr,
    endpoint: Option<BackendEndpoint>,
    /// Requests received before the backend channel became active.
    pending: VecDeque<ProxyRequest>,
    /// Requests forwarded (or buffered) whose response has not arrived yet.
    in_flight: VecDeque<RequestMeta>,
    requests_seen: u64,
    backend: Option<C>,
    status: Option<StatusCode>,
}

impl<C> ConnectionContext<C> {
    pub fn new(id: ConnectionId, client_addr: SocketAddr) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            client_addr,
            endpoint: None,
            pending: VecDeque::new(),
            in_flight: VecDeque::new(),
            requests_seen: 0,
            backend: None,
            status: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn endpoint(&self) -> Option<&BackendEndpoint> {
        self.endpoint.as_ref()
    }

    pub fn set_endpoint(&mut self, endpoint: BackendEndpoint) {
        self.endpoint = Some(endpoint);
    }

    /// Note the arrival of a request. The first request on a connection is
    /// timed from the connection's creation.
    pub fn begin_request(&mut self, request: &ProxyRequest) {
        let started_at = if self.requests_seen == 0 {
            self.created_at
        } else {
            Instant::now()
        };
        self.requests_seen += 1;
        self.in_flight.push_back(RequestMeta {
            method: request.method().clone(),
            uri: request.uri().clone(),
            started_at,
        });
    }

    /// Pop the oldest request still waiting for its response.
    pub fn finish_request(&mut self) -> Option<RequestMeta> {
        self.in_flight.pop_front()
    }

    /// Method of the most recent request, once known.
    pub fn method(&self) -> Option<&Method> {
        self.in_flight.back().map(|m| &m.method)
    }

    /// Target of the most recent request, once known.
    pub fn uri(&self) -> Option<&Uri> {
        self.in_flight.back().map(|m| &m.uri)
    }

    pub fn requests_seen(&self) -> u64 {
        self.requests_seen
    }

    /// Take ownership of a request until the backend is ready.
    pub fn buffer(&mut self, request: ProxyRequest) {
        self.pending.push_back(request);
    }

    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    /// Hand over every buffered request, oldest first.
    pub fn take_buffered(&mut self) -> VecDeque<ProxyRequest> {
        std::mem::take(&mut self.pending)
    }

    /// Drop every buffered request. Returns how many were released.
    pub fn release_buffer(&mut self) -> usize {
        let released = self.pending.len();
        self.pending.clear();
        released
    }

    /// Bind the backend channel. A channel can be bound only once; a second
    /// one is handed back to the caller.
    pub fn bind_backend(&mut self, channel: C) -> Result<(), C> {
        if self.backend.is_some() {
            return Err(channel);
        }
        self.backend = Some(channel);
        Ok(())
    }

    pub fn backend(&self) -> Option<&C> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut C> {
        self.backend.as_mut()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }
}
