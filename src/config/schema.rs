//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the LLM gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream provider base URLs.
    pub upstreams: UpstreamConfig,

    /// Realtime (WebSocket) proxy configuration.
    pub live: LiveConfig,

    /// Optional outbound HTTP proxy for upstream connections.
    pub egress: EgressConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream provider base URLs.
///
/// Operation paths (`/chat/completions`, `/messages`, `/models`) are appended
/// per provider by the route resolver; only the base is configurable.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// OpenAI-compatible API base.
    pub openai: String,

    /// OpenRouter API base.
    pub openrouter: String,

    /// Cerebras API base.
    pub cerebras: String,

    /// Anthropic API base.
    pub anthropic: String,

    /// Gemini generative-language model base. Model name and operation are
    /// appended from the inbound path.
    pub gemini: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            openai: "https://api.openai.com/v1".to_string(),
            openrouter: "https://openrouter.ai/api/v1".to_string(),
            cerebras: "https://api.cerebras.ai/v1".to_string(),
            anthropic: "https://api.anthropic.com/v1".to_string(),
            gemini: "https://generativelanguage.googleapis.com/v1beta/models/".to_string(),
        }
    }
}

/// Realtime WebSocket proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Local path that accepts live WebSocket sessions.
    pub listen_path: String,

    /// Downstream WebSocket endpoint every live session is proxied to.
    pub endpoint: String,

    /// Companion connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        let uri = "/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
        Self {
            listen_path: format!("/google/gemini{}", uri),
            endpoint: format!("wss://generativelanguage.googleapis.com{}", uri),
            connect_timeout_secs: 30,
        }
    }
}

/// Outbound HTTP proxy for upstream HTTP and WebSocket connections.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EgressConfig {
    /// Proxy host; egress proxying is disabled when unset.
    pub proxy_host: Option<String>,

    /// Proxy port.
    pub proxy_port: u16,
}

impl EgressConfig {
    /// The configured proxy as a `host:port` authority, if any.
    pub fn authority(&self) -> Option<String> {
        self.proxy_host
            .as_ref()
            .map(|host| format!("{}:{}", host, self.proxy_port))
    }
}

/// Timeout configuration for upstream operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for a unary upstream request/response in seconds.
    /// Streamed calls are not bounded by this; they end with the stream.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { upstream_secs: 120 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log full request/response bodies for unary calls.
    pub debug_bodies: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_bodies: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
