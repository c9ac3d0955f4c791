//! Server-sent event relay.
//!
//! # Responsibilities
//! - Open one streamed upstream call per inbound streaming request
//! - Forward upstream events to the client connection as they arrive
//! - Detect the `[DONE]` end-of-stream sentinel
//! - Bounded retry on client sends; a dead client never aborts the
//!   upstream read
//! - Finalize (log, cancel upstream, close client) exactly once
//!
//! # Data Flow
//! ```text
//! upstream bytes → SseParser → frames → bounded channel → client body
//! ```

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{Response, StatusCode};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;

use crate::http::request::RelayContext;
use crate::observability::metrics;
use crate::routing::RouteTarget;

use super::RelayError;

/// Provider marker for normal end of an event stream.
pub const STREAM_SENTINEL: &str = "[DONE]";

/// Client sends are attempted this many times before the session stops
/// forwarding (the upstream read continues regardless).
const SEND_ATTEMPTS: usize = 3;

/// Frames buffered between the relay task and the client connection.
const CHANNEL_CAPACITY: usize = 64;

/// Open the upstream stream and return the client-facing streaming response.
///
/// If the upstream answers with a non-success status, its status and body
/// are mirrored back as a one-shot reply instead of a stream.
pub async fn relay_stream(
    client: &reqwest::Client,
    target: &RouteTarget,
    body: Bytes,
    ctx: &RelayContext,
) -> Result<Response<Body>, RelayError> {
    let mut request = client
        .post(&target.upstream_url)
        .header(CONTENT_TYPE, "application/json");
    for (name, value) in &target.headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let upstream = request.body(body).send().await?;
    let status = upstream.status();
    metrics::record_request(ctx.provider, status.as_u16(), ctx.start);

    if !status.is_success() {
        // Upstream refused the stream; its answer becomes the whole reply.
        let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
        let error_body = upstream.bytes().await?;
        tracing::error!(
            request_id = %ctx.request_id,
            status = %status,
            elapsed_ms = ctx.start.elapsed().as_millis() as u64,
            "upstream rejected event stream"
        );
        let mut builder = Response::builder().status(status);
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        return Ok(builder.body(Body::from(error_body))?);
    }

    // The client connection flips to streaming mode before any event flows.
    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
    let session = StreamSession::new(tx, ctx.request_id.clone(), ctx.start);
    let provider = ctx.provider;
    tokio::spawn(run_relay(session, upstream, provider));

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .header(CONNECTION, "keep-alive")
        // Intermediaries must not buffer the event stream.
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(stream))?)
}

/// Consume the upstream event stream, forwarding frames until a terminal
/// trigger fires. Returning drops the upstream response (cancelling the
/// stream) and the channel sender (closing the client connection).
async fn run_relay(mut session: StreamSession, upstream: reqwest::Response, provider: &'static str) {
    let mut stream = upstream.bytes_stream();
    let mut parser = SseParser::default();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::error!(
                    request_id = %session.request_id,
                    error = %e,
                    "upstream stream failed mid-read"
                );
                session.finalize();
                return;
            }
        };

        for event in parser.push(&chunk) {
            if event.data.trim().is_empty() {
                continue;
            }
            session.send_frame(event.encode()).await;
            metrics::record_stream_event(provider);
            if event.data == STREAM_SENTINEL {
                session.finalize();
                return;
            }
        }
    }

    // Clean upstream end-of-stream.
    session.finalize();
}

/// One live event-relay session.
///
/// `finished` is a single-fire gate: concurrent completion triggers (sentinel,
/// upstream close, upstream error) collapse to exactly one finalization.
pub(crate) struct StreamSession {
    tx: mpsc::Sender<Bytes>,
    continue_send: bool,
    finished: Arc<AtomicBool>,
    request_id: String,
    start: Instant,
}

impl StreamSession {
    pub(crate) fn new(tx: mpsc::Sender<Bytes>, request_id: String, start: Instant) -> Self {
        Self {
            tx,
            continue_send: true,
            finished: Arc::new(AtomicBool::new(false)),
            request_id,
            start,
        }
    }

    /// Forward one frame to the client, retrying a bounded number of times.
    /// After all attempts fail the session goes quiet: later frames are
    /// dropped without tearing down the upstream read.
    pub(crate) async fn send_frame(&mut self, frame: Bytes) {
        if !self.continue_send {
            return;
        }
        for attempt in 1..=SEND_ATTEMPTS {
            match self.tx.try_send(frame.clone()) {
                Ok(()) => return,
                Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                    if attempt < SEND_ATTEMPTS {
                        // Give the receiver a chance to drain before retrying.
                        tokio::task::yield_now().await;
                    }
                }
            }
        }
        tracing::warn!(
            request_id = %self.request_id,
            attempts = SEND_ATTEMPTS,
            "client unwritable, dropping further events"
        );
        self.continue_send = false;
    }

    /// Single-fire finalization: log elapsed time once; the caller's return
    /// cancels the upstream stream and closes the client connection.
    /// Returns whether this call performed the transition.
    pub(crate) fn finalize(&self) -> bool {
        if self
            .finished
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::info!(
                request_id = %self.request_id,
                elapsed_ms = self.start.elapsed().as_millis() as u64,
                "stream relay complete"
            );
            true
        } else {
            false
        }
    }
}

/// One upstream server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub(crate) event: Option<String>,
    pub(crate) data: String,
}

impl SseEvent {
    /// Re-encode as wire framing identical to the upstream's type/data pair.
    pub(crate) fn encode(&self) -> Bytes {
        let mut out = String::new();
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        Bytes::from(out)
    }
}

/// Incremental SSE frame parser over the upstream byte stream.
///
/// Frames are blank-line separated; multi-line `data:` fields are joined
/// with newlines per the SSE processing model.
#[derive(Default)]
pub(crate) struct SseParser {
    buffer: String,
}

impl SseParser {
    /// Feed one chunk, returning every completed event.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer
            .push_str(&String::from_utf8_lossy(chunk).replace("\r\n", "\n"));

        let mut events = Vec::new();
        while let Some(idx) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..idx + 2).collect();
            if let Some(event) = parse_frame(&frame) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_frame(frame: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data_lines = Vec::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}
