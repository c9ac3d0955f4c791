//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and upstream URLs parse
//! - Validate value ranges (timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted config path of the offending field.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "listener.bind_address".to_string(),
            message: format!("not a socket address: {}", config.listener.bind_address),
        });
    }

    let upstreams = [
        ("upstreams.openai", &config.upstreams.openai),
        ("upstreams.openrouter", &config.upstreams.openrouter),
        ("upstreams.cerebras", &config.upstreams.cerebras),
        ("upstreams.anthropic", &config.upstreams.anthropic),
        ("upstreams.gemini", &config.upstreams.gemini),
    ];
    for (field, value) in upstreams {
        match Url::parse(value) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError {
                field: field.to_string(),
                message: format!("unsupported scheme: {}", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError {
                field: field.to_string(),
                message: format!("invalid URL: {}", e),
            }),
        }
    }

    match Url::parse(&config.live.endpoint) {
        Ok(url) if url.scheme() == "ws" || url.scheme() == "wss" => {}
        Ok(url) => errors.push(ValidationError {
            field: "live.endpoint".to_string(),
            message: format!("expected ws/wss URL, got scheme {}", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError {
            field: "live.endpoint".to_string(),
            message: format!("invalid URL: {}", e),
        }),
    }

    if !config.live.listen_path.starts_with('/') {
        errors.push(ValidationError {
            field: "live.listen_path".to_string(),
            message: "must start with '/'".to_string(),
        });
    }

    if config.live.connect_timeout_secs == 0 {
        errors.push(ValidationError {
            field: "live.connect_timeout_secs".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError {
            field: "timeouts.upstream_secs".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
