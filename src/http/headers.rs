//! Header manipulation.
//!
//! # Responsibilities
//! - Add or extend X-Forwarded-For with the client IP
//! - Rewrite Host to the selected backend's `host:port`
//! - Optionally stamp a trace header with the connection id
//! - Strip hop-by-hop headers in both directions
//!
//! # Design Decisions
//! - Mutations are applied exactly once, when a request is handed to the backend
//! - Absolute-form request targets are reduced to origin-form

use std::net::SocketAddr;

use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::Uri;

use crate::http::message::ProxyRequest;
use crate::load_balancer::BackendEndpoint;

/// Forwarding marker header.
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Request mutation policy applied to every forwarded request.
#[derive(Debug, Clone, Default)]
pub struct RequestMutator {
    trace_header: Option<HeaderName>,
}

impl RequestMutator {
    pub fn new(trace_header: Option<HeaderName>) -> Self {
        Self { trace_header }
    }

    /// Build from the configured trace header name; an invalid name is
    /// ignored (validation rejects it before this point).
    pub fn from_config(trace_header: Option<&str>) -> Self {
        let trace_header = trace_header.and_then(|name| {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| tracing::warn!(header = name, error = %e, "Ignoring trace header"))
                .ok()
        });
        Self::new(trace_header)
    }

    pub fn trace_header(&self) -> Option<&HeaderName> {
        self.trace_header.as_ref()
    }

    /// Prepare `request` for `backend`.
    pub fn apply(
        &self,
        request: &mut ProxyRequest,
        client: SocketAddr,
        backend: &BackendEndpoint,
        trace_id: &str,
    ) {
        if let Some(origin) = request.uri().path_and_query().cloned() {
            if request.uri().authority().is_some() {
                *request.uri_mut() = Uri::from(origin);
            }
        }

        let headers = request.headers_mut();
        strip_hop_by_hop(headers);

        let client_ip = client.ip().to_string();
        let forwarded = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}, {client_ip}"),
            _ => client_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            headers.insert(X_FORWARDED_FOR, value);
        }

        match HeaderValue::from_str(&backend.authority()) {
            Ok(host) => {
                headers.insert(header::HOST, host);
            }
            Err(e) => {
                tracing::warn!(backend = %backend, error = %e, "Backend authority is not a valid Host value");
            }
        }

        if let Some(name) = &self.trace_header {
            if let Ok(value) = HeaderValue::from_str(trace_id) {
                headers.insert(name.clone(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;
    use hyper::Request;

    fn client() -> SocketAddr {
        "192.168.1.20:51234".parse().unwrap()
    }

    fn request(uri: &str) -> ProxyRequest {
        Request::builder()
            .uri(uri)
            .header(header::HOST, "proxy.example.com")
            .header(header::CONNECTION, "keep-alive, x-custom-hop")
            .header("x-custom-hop", "1")
            .header("keep-alive", "timeout=5")
            .header("accept", "text/plain")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[test]
    fn rewrites_host_and_sets_forwarded_for() {
        let mut req = request("/api/items?page=2");
        let backend = BackendEndpoint::new("10.0.0.5", 9000);
        RequestMutator::default().apply(&mut req, client(), &backend, "conn-1");

        assert_eq!(req.headers()[header::HOST], "10.0.0.5:9000");
        assert_eq!(req.headers()[&X_FORWARDED_FOR], "192.168.1.20");
        assert_eq!(req.uri(), "/api/items?page=2");
        assert_eq!(req.headers()["accept"], "text/plain");
    }

    #[test]
    fn strips_hop_by_hop_headers() {
        let mut req = request("/");
        RequestMutator::default().apply(&mut req, client(), &BackendEndpoint::new("b", 1), "conn-1");
        assert!(req.headers().get(header::CONNECTION).is_none());
        assert!(req.headers().get("keep-alive").is_none());
        assert!(req.headers().get("x-custom-hop").is_none());
    }

    #[test]
    fn extends_existing_forwarded_for() {
        let mut req = request("/");
        req.headers_mut()
            .insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.7"));
        RequestMutator::default().apply(&mut req, client(), &BackendEndpoint::new("b", 1), "conn-1");
        assert_eq!(req.headers()[&X_FORWARDED_FOR], "203.0.113.7, 192.168.1.20");
    }

    #[test]
    fn absolute_form_becomes_origin_form() {
        let mut req = request("http://proxy.example.com/a/b?c=d");
        RequestMutator::default().apply(&mut req, client(), &BackendEndpoint::new("b", 1), "conn-1");
        assert_eq!(req.uri(), "/a/b?c=d");
    }

    #[test]
    fn trace_header_carries_connection_id() {
        let mutator = RequestMutator::from_config(Some("x-trace-id"));
        let mut req = request("/");
        mutator.apply(&mut req, client(), &BackendEndpoint::new("b", 1), "conn-42");
        assert_eq!(req.headers()["x-trace-id"], "conn-42");
    }

    #[test]
    fn invalid_trace_header_is_ignored() {
        let mutator = RequestMutator::from_config(Some("not valid"));
        assert!(mutator.trace_header().is_none());
    }
}
