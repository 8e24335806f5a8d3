//! Message aggregation.
//!
//! # Responsibilities
//! - Collect streaming hyper bodies into whole messages
//! - Enforce the configured body size limit
//! - Define the owned message types the bridge moves around
//!
//! # Design Decisions
//! - The bridge never sees partial frames; an aggregation failure is a
//!   protocol error for the peer that sent the message
//! - Messages are plain owned values; ownership moves into the write path

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::{Request, Response};

use crate::error::{BridgeError, Peer};

/// A fully aggregated request travelling client → backend.
pub type ProxyRequest = Request<Full<Bytes>>;

/// A fully aggregated response travelling backend → client.
pub type ProxyResponse = Response<Full<Bytes>>;

async fn collect<B>(body: B, limit: usize, peer: Peer) -> Result<Bytes, BridgeError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Limited::new(body, limit)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| BridgeError::protocol(peer, e.to_string()))
}

/// Aggregate a client request, rejecting bodies over `limit` bytes.
pub async fn aggregate_request<B>(request: Request<B>, limit: usize) -> Result<ProxyRequest, BridgeError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = request.into_parts();
    let bytes = collect(body, limit, Peer::Client).await?;
    Ok(Request::from_parts(parts, Full::new(bytes)))
}

/// Aggregate a backend response, rejecting bodies over `limit` bytes.
pub async fn aggregate_response<B>(
    response: Response<B>,
    limit: usize,
) -> Result<ProxyResponse, BridgeError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let bytes = collect(body, limit, Peer::Backend).await?;
    Ok(Response::from_parts(parts, Full::new(bytes)))
}
