//! Duplex session proxying.
//!
//! # Responsibilities
//! - Open one companion WebSocket per inbound live session, with timeout
//! - Relay text/binary frames verbatim in both directions
//! - Tear both legs down together, exactly once, from either trigger
//!
//! # Data Flow
//! ```text
//! Client ←── WebSocket frames ──→ Gateway ←── WebSocket frames ──→ Companion
//! ```
//!
//! # Design Decisions
//! - Frame-level forwarding, no message buffering or acknowledgement
//! - Frames arriving while the companion is still connecting are dropped,
//!   never queued (bounded-latency realtime protocol)
//! - A companion failure is fatal to the session; there is no reconnect

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as ClientMessage, WebSocket};
use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, HeaderValue};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message as CompanionMessage;
use tokio_tungstenite::{client_async_tls, connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::{EgressConfig, LiveConfig};
use crate::live::registry::{SessionHandle, SessionRegistry, SessionState};
use crate::observability::metrics;

type CompanionSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound handshake headers the companion endpoint requires for its own
/// authentication.
#[derive(Debug, Clone, Default)]
pub struct CompanionParams {
    pub api_key: Option<String>,
    pub api_client: Option<String>,
    pub user_agent: Option<String>,
}

impl CompanionParams {
    /// Capture the relayed headers from the inbound handshake.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        Self {
            api_key: get("x-goog-api-key"),
            api_client: get("x-goog-api-client"),
            user_agent: get("user-agent"),
        }
    }
}

/// Errors establishing or driving a companion connection.
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("companion connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("companion handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("egress proxy error: {0}")]
    Proxy(String),

    #[error("companion I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid companion endpoint: {0}")]
    Endpoint(String),
}

/// One inbound live session paired 1:1 with a companion connection.
///
/// The registry owns the handle; the session owns the companion socket
/// exclusively for its whole lifetime.
pub struct DuplexSession {
    registry: SessionRegistry,
    handle: std::sync::Arc<SessionHandle>,
}

impl DuplexSession {
    pub fn new(registry: SessionRegistry, handle: std::sync::Arc<SessionHandle>) -> Self {
        Self { registry, handle }
    }

    /// Drive the session to completion: connect the companion, relay frames
    /// while open, and tear down both legs when either side ends.
    pub async fn run(
        self,
        mut client: WebSocket,
        params: CompanionParams,
        live: &LiveConfig,
        egress: &EgressConfig,
    ) {
        let key = self.handle.key().clone();
        self.handle.set_state(SessionState::Connecting);

        let timeout = Duration::from_secs(live.connect_timeout_secs);
        let connect = open_companion(&live.endpoint, &params, egress);
        tokio::pin!(connect);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        // The connect gate: exactly one of {open, handshake failure, timeout,
        // client gone} resolves this loop. Inbound frames arriving while the
        // companion is still connecting are dropped, not queued.
        let companion = loop {
            tokio::select! {
                result = &mut connect => match result {
                    Ok(companion) => break companion,
                    Err(e) => {
                        tracing::error!(session = %key, error = %e, "companion connect failed");
                        self.fail(client, format!("companion connect failed: {}", e)).await;
                        return;
                    }
                },
                _ = &mut deadline => {
                    let e = LiveError::ConnectTimeout(timeout);
                    tracing::error!(session = %key, error = %e, "companion connect failed");
                    self.fail(client, e.to_string()).await;
                    return;
                }
                inbound = client.recv() => match inbound {
                    Some(Ok(ClientMessage::Close(_))) | None => {
                        tracing::info!(session = %key, "client left before companion opened");
                        self.teardown(SessionState::Closed);
                        return;
                    }
                    Some(Ok(_)) => {
                        tracing::debug!(session = %key, "dropping frame received while connecting");
                    }
                    Some(Err(e)) => {
                        tracing::warn!(session = %key, error = %e, "client errored while connecting");
                        self.teardown(SessionState::Failed);
                        return;
                    }
                }
            }
        };

        self.handle.set_state(SessionState::Open);
        metrics::live_session_opened();
        tracing::info!(session = %key, endpoint = %live.endpoint, "companion connected");

        let (mut companion_tx, mut companion_rx) = companion.split();
        let (mut client_tx, mut client_rx) = client.split();

        let client_to_companion = async {
            while let Some(frame) = client_rx.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(_) => break,
                };
                let forward = match frame {
                    ClientMessage::Text(text) => CompanionMessage::Text(text.to_string().into()),
                    ClientMessage::Binary(data) => CompanionMessage::Binary(data),
                    ClientMessage::Ping(data) => CompanionMessage::Ping(data),
                    ClientMessage::Pong(data) => CompanionMessage::Pong(data),
                    ClientMessage::Close(_) => {
                        let _ = companion_tx.send(CompanionMessage::Close(None)).await;
                        break;
                    }
                };
                if companion_tx.send(forward).await.is_err() {
                    break;
                }
            }
        };

        let companion_to_client = async {
            while let Some(frame) = companion_rx.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(_) => break,
                };
                let forward = match frame {
                    CompanionMessage::Text(text) => ClientMessage::Text(text.to_string().into()),
                    CompanionMessage::Binary(data) => ClientMessage::Binary(data),
                    CompanionMessage::Ping(data) => ClientMessage::Ping(data),
                    CompanionMessage::Pong(data) => ClientMessage::Pong(data),
                    CompanionMessage::Close(_) => {
                        let _ = client_tx.send(ClientMessage::Close(None)).await;
                        break;
                    }
                    CompanionMessage::Frame(_) => continue,
                };
                if client_tx.send(forward).await.is_err() {
                    break;
                }
            }
        };

        // Either leg ending cancels the other; the unfinished halves drop
        // here, closing both underlying connections.
        tokio::select! {
            _ = client_to_companion => {}
            _ = companion_to_client => {}
        }

        metrics::live_session_closed();
        self.teardown(SessionState::Closed);
    }

    /// Terminal connect failure: close the inbound leg with a reason and
    /// release the registry entry. No companion retry.
    async fn fail(&self, mut client: WebSocket, reason: String) {
        let _ = client
            .send(ClientMessage::Close(Some(CloseFrame {
                code: 1011,
                reason: reason.into(),
            })))
            .await;
        self.teardown(SessionState::Failed);
    }

    /// Single-fire teardown, safe to reach from either leg.
    fn teardown(&self, state: SessionState) {
        if self.handle.begin_teardown() {
            self.handle.set_state(state);
            self.registry.remove(self.handle.key());
            tracing::info!(
                session = %self.handle.key(),
                state = ?state,
                live_sessions = self.registry.len(),
                "live session closed"
            );
        }
    }
}

/// Open the companion WebSocket, forwarding the captured handshake headers,
/// through the egress proxy when one is configured.
async fn open_companion(
    endpoint: &str,
    params: &CompanionParams,
    egress: &EgressConfig,
) -> Result<CompanionSocket, LiveError> {
    let mut request = endpoint.into_client_request()?;
    let headers = request.headers_mut();
    if let Some(user_agent) = &params.user_agent {
        if let Ok(value) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, value);
        }
    }
    if let Some(api_key) = &params.api_key {
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("x-goog-api-key", value);
        }
    }
    if let Some(api_client) = &params.api_client {
        if let Ok(value) = HeaderValue::from_str(api_client) {
            headers.insert("x-goog-api-client", value);
        }
    }

    match egress.authority() {
        None => {
            let (companion, _) = connect_async(request).await?;
            Ok(companion)
        }
        Some(proxy) => {
            let host = request
                .uri()
                .host()
                .ok_or_else(|| LiveError::Endpoint(endpoint.to_string()))?
                .to_string();
            let port = request.uri().port_u16().unwrap_or(
                if request.uri().scheme_str() == Some("wss") {
                    443
                } else {
                    80
                },
            );
            let stream = connect_via_proxy(&proxy, &host, port).await?;
            let (companion, _) = client_async_tls(request, stream).await?;
            Ok(companion)
        }
    }
}

/// Establish a raw TCP tunnel to `host:port` through an HTTP CONNECT proxy.
async fn connect_via_proxy(proxy: &str, host: &str, port: u16) -> Result<TcpStream, LiveError> {
    let mut stream = TcpStream::connect(proxy).await?;

    let connect = format!(
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\nProxy-Connection: keep-alive\r\n\r\n",
    );
    stream.write_all(connect.as_bytes()).await?;

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(LiveError::Proxy("connection closed during CONNECT".into()));
        }
        head.push(byte[0]);
        if head.len() > 8192 {
            return Err(LiveError::Proxy("oversized CONNECT response".into()));
        }
    }

    let status_line = String::from_utf8_lossy(&head);
    let ok = status_line
        .lines()
        .next()
        .map(|line| line.split_whitespace().nth(1) == Some("200"))
        .unwrap_or(false);
    if !ok {
        return Err(LiveError::Proxy(format!(
            "CONNECT refused: {}",
            status_line.lines().next().unwrap_or("empty response")
        )));
    }
    Ok(stream)
}
