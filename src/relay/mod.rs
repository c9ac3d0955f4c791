//! Upstream relay subsystem.
//!
//! Two relay modes share the outbound `reqwest` client:
//! - `unary`: one call, status and body mirrored back verbatim
//! - `sse`: streamed call bridged event-by-event to the client connection

pub mod sse;
pub mod unary;

use thiserror::Error;

/// Errors crossing the relay boundary.
///
/// Upstream application errors (non-success statuses) are not errors here;
/// they are mirrored to the caller verbatim.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The outbound call itself failed: no response at all.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// The mirrored client response could not be assembled.
    #[error("failed to build client response: {0}")]
    Response(#[from] axum::http::Error),
}
