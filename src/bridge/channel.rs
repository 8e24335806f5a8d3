//! The two ends a bridge writes to.
//!
//! [`BackendChannel`] and [`ClientSink`] are the seams between the bridge
//! state machine and the I/O layer. Writes are non-blocking hand-offs: the
//! message moves into the I/O layer and the call returns immediately.
//!
//! The hyper-backed implementations live here as well:
//!
//! ```text
//! Bridge ──forward──▶ BackendHandle ──mpsc──▶ pump task ──send_request──▶ backend
//!        ◀─────────────────── SessionEvent::Backend(Message) ◀──────────────┘
//!        ──resume_read──▶ semaphore permit lets the pump start the next exchange
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::client::conn::http1::SendRequest;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{AbortHandle, JoinHandle};

use crate::bridge::session::SessionEvent;
use crate::error::{BridgeError, Peer};
use crate::http::message::{aggregate_response, ProxyRequest, ProxyResponse};

/// Write side of the backend connection.
pub trait BackendChannel {
    /// Hand `request` to the backend write path.
    fn forward(&mut self, request: ProxyRequest) -> Result<(), BridgeError>;

    /// Allow the backend side to read its next message.
    fn resume_read(&mut self);

    /// Close the backend connection. Closing a closed channel is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Write side of the client connection.
pub trait ClientSink {
    /// Hand `response` to the client write path.
    fn send(&mut self, response: ProxyResponse) -> Result<(), BridgeError>;

    /// Close the client connection. Closing a closed sink is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Events produced by the backend side of a session.
#[derive(Debug)]
pub enum BackendEvent {
    /// A complete response.
    Message(ProxyResponse),
    /// The exchange failed.
    Failed(BridgeError),
    /// The backend closed its connection.
    Closed,
}

/// Client side of a hyper server connection.
///
/// Each request the server dispatches leaves a responder here; responses are
/// matched to responders in arrival order.
#[derive(Debug)]
pub struct ClientHandle {
    pending: VecDeque<oneshot::Sender<ProxyResponse>>,
    open: bool,
}

impl ClientHandle {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            open: true,
        }
    }

    /// Register the responder for the next request.
    pub fn push(&mut self, responder: oneshot::Sender<ProxyResponse>) {
        if self.open {
            self.pending.push_back(responder);
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Default for ClientHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSink for ClientHandle {
    fn send(&mut self, response: ProxyResponse) -> Result<(), BridgeError> {
        if !self.open {
            return Err(BridgeError::PeerClosed(Peer::Client));
        }
        let responder = self.pending.pop_front().ok_or_else(|| {
            BridgeError::protocol(Peer::Backend, "response without a pending request")
        })?;
        responder
            .send(response)
            .map_err(|_| BridgeError::PeerClosed(Peer::Client))
    }

    fn close(&mut self) {
        self.open = false;
        // Dropping the responders fails the waiting requests, which makes
        // hyper close the client connection.
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Backend side: one hyper HTTP/1.1 client connection plus its pump task.
#[derive(Debug)]
pub struct BackendHandle {
    requests: Option<mpsc::UnboundedSender<ProxyRequest>>,
    read_permits: Arc<Semaphore>,
    pump: AbortHandle,
    driver: AbortHandle,
}

impl BackendHandle {
    /// Start pumping requests through `sender`. `driver` is the spawned
    /// hyper connection task; its completion means the backend closed.
    pub fn spawn(
        sender: SendRequest<Full<Bytes>>,
        driver: JoinHandle<()>,
        max_body_bytes: usize,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (requests, queue) = mpsc::unbounded_channel();
        let read_permits = Arc::new(Semaphore::new(0));
        let driver_abort = driver.abort_handle();

        let pump = tokio::spawn(pump(
            sender,
            queue,
            Arc::clone(&read_permits),
            driver,
            max_body_bytes,
            events,
        ));

        Self {
            requests: Some(requests),
            read_permits,
            pump: pump.abort_handle(),
            driver: driver_abort,
        }
    }
}

impl BackendChannel for BackendHandle {
    fn forward(&mut self, request: ProxyRequest) -> Result<(), BridgeError> {
        let requests = self
            .requests
            .as_ref()
            .ok_or(BridgeError::PeerClosed(Peer::Backend))?;
        requests
            .send(request)
            .map_err(|_| BridgeError::PeerClosed(Peer::Backend))
    }

    fn resume_read(&mut self) {
        if self.requests.is_some() {
            self.read_permits.add_permits(1);
        }
    }

    fn close(&mut self) {
        if self.requests.take().is_none() {
            return;
        }
        self.read_permits.close();
        self.pump.abort();
        self.driver.abort();
    }

    fn is_open(&self) -> bool {
        self.requests.is_some()
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn emit(events: &mpsc::UnboundedSender<SessionEvent>, event: BackendEvent) -> bool {
    events.send(SessionEvent::Backend(event)).is_ok()
}

/// Send queued requests one at a time. After each response is emitted the
/// pump waits for a read permit, so at most one response is ever waiting
/// for the client.
async fn pump(
    mut sender: SendRequest<Full<Bytes>>,
    mut queue: mpsc::UnboundedReceiver<ProxyRequest>,
    read_permits: Arc<Semaphore>,
    mut driver: JoinHandle<()>,
    max_body_bytes: usize,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    loop {
        let request = tokio::select! {
            biased;
            next = queue.recv() => match next {
                Some(request) => request,
                None => return,
            },
            _ = &mut driver => break,
        };

        if sender.ready().await.is_err() {
            // Closed between exchanges: a disconnect, not a failure.
            break;
        }

        let response = match sender.send_request(request).await {
            Ok(response) => response,
            Err(e) => {
                emit(&events, BackendEvent::Failed(BridgeError::Exchange(e)));
                return;
            }
        };

        let response = match aggregate_response(response, max_body_bytes).await {
            Ok(response) => response,
            Err(e) => {
                emit(&events, BackendEvent::Failed(e));
                return;
            }
        };

        if !emit(&events, BackendEvent::Message(response)) {
            return;
        }

        match read_permits.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return,
        }
    }

    emit(&events, BackendEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn response(body: &'static str) -> ProxyResponse {
        hyper::Response::new(Full::new(Bytes::from_static(body.as_bytes())))
    }

    #[tokio::test]
    async fn responses_follow_request_order() {
        let mut client = ClientHandle::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        client.push(tx1);
        client.push(tx2);

        client.send(response("one")).unwrap();
        client.send(response("two")).unwrap();
        assert_eq!(client.pending(), 0);

        let first = rx1.await.unwrap().into_body().collect().await.unwrap().to_bytes();
        let second = rx2.await.unwrap().into_body().collect().await.unwrap().to_bytes();
        assert_eq!(first, "one");
        assert_eq!(second, "two");
    }

    #[test]
    fn unsolicited_response_is_backend_protocol_error() {
        let mut client = ClientHandle::new();
        let err = client.send(response("stray")).unwrap_err();
        assert!(err.blames_backend());
    }

    #[test]
    fn send_after_client_went_away() {
        let mut client = ClientHandle::new();
        let (tx, rx) = oneshot::channel();
        client.push(tx);
        drop(rx);
        assert!(matches!(
            client.send(response("late")),
            Err(BridgeError::PeerClosed(Peer::Client))
        ));
    }

    #[test]
    fn close_is_idempotent_and_drops_responders() {
        let mut client = ClientHandle::new();
        let (tx, mut rx) = oneshot::channel();
        client.push(tx);

        client.close();
        client.close();
        assert!(!client.is_open());
        assert!(rx.try_recv().is_err());
        assert!(matches!(
            client.send(response("x")),
            Err(BridgeError::PeerClosed(Peer::Client))
        ));
    }
}
