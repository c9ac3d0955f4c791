//! LLM Gateway Library
//!
//! A protocol-translating gateway in front of several LLM provider APIs,
//! built with Tokio and Axum.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod live;
pub mod observability;
pub mod relay;
pub mod routing;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
