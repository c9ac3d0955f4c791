//! Unary request relay.
//!
//! # Responsibilities
//! - Execute exactly one outbound call for a resolved target
//! - Mirror upstream status and body back to the caller byte-for-byte
//! - Preserve upstream content encoding (no re-compression)
//! - Log elapsed time per request
//!
//! # Design Decisions
//! - No retries: an outbound transport failure is fatal for the request
//! - The response body is buffered; unary payloads are bounded JSON

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::{Method, Response};

use crate::http::request::RelayContext;
use crate::observability::metrics;
use crate::routing::RouteTarget;

use super::RelayError;

/// Execute one outbound call and mirror the upstream reply.
///
/// The upstream status is copied verbatim, including application errors
/// (4xx/5xx), which are the upstream's answer and not a relay failure.
pub async fn relay_unary(
    client: &reqwest::Client,
    target: &RouteTarget,
    method: Method,
    body: Option<Bytes>,
    timeout: Duration,
    ctx: &RelayContext,
    debug_bodies: bool,
) -> Result<Response<Body>, RelayError> {
    let mut request = client
        .request(method, &target.upstream_url)
        .timeout(timeout);
    for (name, value) in &target.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &body {
        request = request
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone());
    }

    let upstream = request.send().await?;
    let status = upstream.status();
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
    let content_encoding = upstream.headers().get(CONTENT_ENCODING).cloned();
    let response_body = upstream.bytes().await?;

    if debug_bodies {
        let request_body = body
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or(std::borrow::Cow::Borrowed(""));
        tracing::info!(
            request_id = %ctx.request_id,
            request = %request_body,
            response = %String::from_utf8_lossy(&response_body),
            "unary exchange"
        );
    }

    let elapsed = ctx.start.elapsed();
    tracing::info!(
        request_id = %ctx.request_id,
        status = %status,
        elapsed_ms = elapsed.as_millis() as u64,
        "unary relay complete"
    );
    metrics::record_request(ctx.provider, status.as_u16(), ctx.start);

    // Forwarding content-encoding untouched keeps an already-compressed
    // upstream body from being re-encoded on the way out.
    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    if let Some(content_encoding) = content_encoding {
        builder = builder.header(CONTENT_ENCODING, content_encoding);
    }
    Ok(builder.body(Body::from(response_body))?)
}
