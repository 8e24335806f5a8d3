//! Backend dialing.
//!
//! A dial is TCP connect plus HTTP/1.1 handshake, bounded by the connect
//! timeout. It runs on its own task and reports back to the session as an
//! event, so no bridge handler ever waits on it.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;

use crate::bridge::channel::BackendHandle;
use crate::bridge::session::SessionEvent;
use crate::error::DialError;
use crate::load_balancer::BackendEndpoint;

/// Open a fresh connection to `endpoint`.
pub async fn dial(
    endpoint: &BackendEndpoint,
    connect_timeout: Duration,
    max_body_bytes: usize,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> Result<BackendHandle, DialError> {
    let host = endpoint.host().trim_start_matches('[').trim_end_matches(']');

    let stream = time::timeout(connect_timeout, TcpStream::connect((host, endpoint.port())))
        .await
        .map_err(|_| DialError::Timeout(connect_timeout))?
        .map_err(DialError::Connect)?;
    stream.set_nodelay(true).map_err(DialError::Connect)?;

    let (sender, conn) = time::timeout(
        connect_timeout,
        http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream)),
    )
    .await
    .map_err(|_| DialError::Timeout(connect_timeout))?
    .map_err(DialError::Handshake)?;

    let backend = endpoint.clone();
    let driver = tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(backend = %backend, error = %e, "Backend connection ended with error");
        }
    });

    tracing::debug!(backend = %endpoint, "Backend connected");
    Ok(BackendHandle::spawn(sender, driver, max_body_bytes, events))
}

/// Dial `endpoint` and deliver the outcome to the session.
///
/// If the session is already gone the fresh connection is dropped, which
/// closes it.
pub async fn dial_and_report(
    endpoint: BackendEndpoint,
    connect_timeout: Duration,
    max_body_bytes: usize,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let outcome = dial(&endpoint, connect_timeout, max_body_bytes, events.clone()).await;
    if events.send(SessionEvent::Dialed(outcome)).is_err() {
        tracing::debug!(backend = %endpoint, "Session closed before dial completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (events, _rx) = mpsc::unbounded_channel();
        let endpoint = BackendEndpoint::new("127.0.0.1", port);
        let err = dial(&endpoint, Duration::from_secs(1), 1024, events)
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::Connect(_)));
    }

    #[tokio::test]
    async fn successful_dial_yields_open_channel() {
        use crate::bridge::channel::BackendChannel;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            time::sleep(Duration::from_secs(1)).await;
        });

        let (events, mut rx) = mpsc::unbounded_channel();
        dial_and_report(
            BackendEndpoint::new("127.0.0.1", addr.port()),
            Duration::from_secs(1),
            1024,
            events,
        )
        .await;

        match rx.recv().await {
            Some(SessionEvent::Dialed(Ok(mut handle))) => {
                assert!(handle.is_open());
                handle.close();
                handle.close();
                assert!(!handle.is_open());
            }
            _ => panic!("expected a successful dial"),
        }
    }
}
