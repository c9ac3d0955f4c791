//! LLM Gateway
//!
//! A protocol-translating gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                   LLM GATEWAY                     │
//!                        │                                                   │
//!   Client Request       │  ┌─────────┐   ┌──────────┐   ┌──────────────┐  │
//!   ────────────────────-┼─▶│  http   │──▶│ routing  │──▶│ relay        │──┼──▶ Provider API
//!                        │  │ server  │   │ resolver │   │ unary / sse  │  │    (OpenAI, Anthropic,
//!                        │  └─────────┘   └──────────┘   └──────────────┘  │     Gemini, ...)
//!                        │                                                   │
//!   Live WebSocket       │  ┌─────────┐   ┌──────────┐   ┌──────────────┐  │
//!   ◀───────────────────-┼─▶│  live   │──▶│ session  │◀─▶│  companion   │──┼──▶ Gemini Live
//!                        │  │ upgrade │   │ registry │   │  connection  │  │    WebSocket
//!                        │  └─────────┘   └──────────┘   └──────────────┘  │
//!                        │                                                   │
//!                        │  ┌────────────────────────────────────────────┐  │
//!                        │  │           Cross-Cutting Concerns            │  │
//!                        │  │  ┌────────┐ ┌─────────────┐ ┌───────────┐  │  │
//!                        │  │  │ config │ │observability│ │ lifecycle │  │  │
//!                        │  │  └────────┘ └─────────────┘ └───────────┘  │  │
//!                        │  └────────────────────────────────────────────┘  │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::Path;

use tokio::net::TcpListener;

use llm_gateway::config::loader::load_config;
use llm_gateway::observability::{logging, metrics};
use llm_gateway::{GatewayConfig, HttpServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration; defaults apply when no file is given.
    let config = match std::env::var("GATEWAY_CONFIG") {
        Ok(path) => load_config(Path::new(&path))?,
        Err(_) => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);

    tracing::info!("llm-gateway v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        live_endpoint = %config.live.endpoint,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "Configuration loaded"
    );

    // Bind TCP listener
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        address = %local_addr,
        "Listening for connections"
    );

    // Initialize metrics server
    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    shutdown.listen_for_ctrl_c();

    // Create and run HTTP server
    let server = HttpServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
