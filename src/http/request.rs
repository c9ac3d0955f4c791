//! Request identity and per-request context.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4)
//! - Capture the read-only per-request context at entry
//!
//! # Design Decisions
//! - Request ID added as early as possible (outermost layer) for tracing
//! - Context is created once and never mutated afterwards

use std::net::SocketAddr;
use std::time::Instant;

use axum::http::{HeaderMap, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the per-request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Mints UUIDv4 request ids for the set-request-id layer.
#[derive(Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Read-only context for one relayed request.
///
/// Created at request entry, used for logging and latency measurement,
/// discarded when the request completes.
#[derive(Debug, Clone)]
pub struct RelayContext {
    pub request_id: String,
    pub client_addr: SocketAddr,
    pub start: Instant,
    pub provider: &'static str,
}

impl RelayContext {
    /// Capture the context from the inbound request.
    pub fn new(headers: &HeaderMap, client_addr: SocketAddr, provider: &'static str) -> Self {
        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        Self {
            request_id,
            client_addr,
            start: Instant::now(),
            provider,
        }
    }
}
