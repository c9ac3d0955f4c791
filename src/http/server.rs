//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the relay and live handlers
//! - Wire up middleware (tracing, CORS, request ID, timeout)
//! - Classify inbound requests via the route resolver
//! - Dispatch to the unary or event relay, or upgrade live sessions
//!
//! # Design Decisions
//! - One catch-all route; the resolver owns provider classification
//! - The live path is registered explicitly from config
//! - Bodies pass through untouched apart from the `stream` flag read

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    http::{HeaderMap, Method, Request, Response, StatusCode},
    response::IntoResponse,
    routing::any,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::CorsLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::request::{MakeRequestUuid, RelayContext};
use crate::live::{CompanionParams, DuplexSession, SessionRegistry};
use crate::observability::metrics;
use crate::relay::{sse, unary, RelayError};
use crate::routing::{self, ResolveError};

/// Largest accepted inbound body. Chat payloads are bounded JSON.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub client: reqwest::Client,
    pub sessions: SessionRegistry,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let client = build_client(&config);
        let state = AppState {
            config: Arc::new(config),
            client,
            sessions: SessionRegistry::new(),
        };

        let router = Self::build_router(state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        // Headroom over the per-call upstream timeout so the relay's own
        // error mapping answers before the layer cuts in.
        let layer_timeout = Duration::from_secs(state.config.timeouts.upstream_secs + 10);
        let live_path = state.config.live.listen_path.clone();

        Router::new()
            .route(&live_path, any(live_handler))
            .route("/{*path}", any(relay_handler))
            .route("/", any(relay_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(layer_timeout))
            .layer(CorsLayer::permissive())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main relay handler: classify the request, then dispatch to the unary or
/// event relay.
async fn relay_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);
    let ctx = RelayContext::new(&parts.headers, addr, routing::provider_label(&path));

    tracing::info!(
        request_id = %ctx.request_id,
        from = %ctx.client_addr,
        method = %parts.method,
        path = %path,
        "relaying request"
    );

    let timeout = Duration::from_secs(state.config.timeouts.upstream_secs);
    let debug_bodies = state.config.observability.debug_bodies;

    // Models listing is the one GET surface; everything else carries a body.
    if parts.method == Method::GET && path.ends_with("/models") {
        return match routing::resolve_models(&state.config.upstreams, &path, &parts.headers) {
            Ok(target) => {
                match unary::relay_unary(
                    &state.client,
                    &target,
                    Method::GET,
                    None,
                    timeout,
                    &ctx,
                    debug_bodies,
                )
                .await
                {
                    Ok(response) => response,
                    Err(e) => upstream_failure(&ctx, e),
                }
            }
            Err(e) => resolve_failure(&ctx, e),
        };
    }

    let body_bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %ctx.request_id, error = %e, "failed to read body");
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({"error": "request body too large"})),
            )
                .into_response();
        }
    };

    match routing::resolve_chat(
        &state.config.upstreams,
        &path,
        query.as_deref(),
        &parts.headers,
        &body_bytes,
    ) {
        Ok(target) if target.streaming => {
            match sse::relay_stream(&state.client, &target, body_bytes, &ctx).await {
                Ok(response) => response,
                Err(e) => upstream_failure(&ctx, e),
            }
        }
        Ok(target) => {
            match unary::relay_unary(
                &state.client,
                &target,
                Method::POST,
                Some(body_bytes),
                timeout,
                &ctx,
                debug_bodies,
            )
            .await
            {
                Ok(response) => response,
                Err(e) => upstream_failure(&ctx, e),
            }
        }
        Err(e) => resolve_failure(&ctx, e),
    }
}

/// Live WebSocket handler: register the session, then hand the upgraded
/// socket to the duplex proxy.
async fn live_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response<Body> {
    let params = CompanionParams::from_headers(&headers);
    let key = state.sessions.mint_key(addr);

    // Create-if-absent: a key that lost this race never opens a companion.
    let Some(handle) = state.sessions.insert(key.clone()) else {
        tracing::warn!(session = %key, "duplicate session key, rejecting");
        return (StatusCode::CONFLICT, "session already active").into_response();
    };

    tracing::info!(session = %key, from = %addr, "live session accepted");

    let registry = state.sessions.clone();
    let config = state.config.clone();
    ws.on_upgrade(move |socket| async move {
        DuplexSession::new(registry, handle)
            .run(socket, params, &config.live, &config.egress)
            .await;
    })
}

/// Map a classification failure to its client-visible reply.
fn resolve_failure(ctx: &RelayContext, error: ResolveError) -> Response<Body> {
    let status = match error {
        ResolveError::EmptyBody | ResolveError::MalformedModelPath(_) => StatusCode::BAD_REQUEST,
        ResolveError::UnknownPrefix(_) => StatusCode::NOT_FOUND,
    };
    tracing::warn!(
        request_id = %ctx.request_id,
        error = %error,
        "request rejected before upstream call"
    );
    metrics::record_request(ctx.provider, status.as_u16(), ctx.start);
    (status, Json(json!({"error": error.to_string()}))).into_response()
}

/// Map an outbound transport failure to a 5xx reply. Never retried.
fn upstream_failure(ctx: &RelayContext, error: RelayError) -> Response<Body> {
    tracing::error!(
        request_id = %ctx.request_id,
        error = %error,
        elapsed_ms = ctx.start.elapsed().as_millis() as u64,
        "upstream relay failed"
    );
    metrics::record_request(ctx.provider, StatusCode::BAD_GATEWAY.as_u16(), ctx.start);
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({"error": error.to_string()})),
    )
        .into_response()
}

/// Build the shared outbound client, honoring the egress proxy when set.
fn build_client(config: &GatewayConfig) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if let Some(authority) = config.egress.authority() {
        match reqwest::Proxy::all(format!("http://{}", authority)) {
            Ok(proxy) => {
                tracing::info!(proxy = %authority, "egress proxy enabled");
                builder = builder.proxy(proxy);
            }
            Err(e) => {
                tracing::error!(proxy = %authority, error = %e, "invalid egress proxy, going direct");
            }
        }
    }
    builder.build().expect("reqwest client construction")
}
