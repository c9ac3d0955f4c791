//! Route resolution subsystem.
//!
//! Classifies inbound requests by provider prefix and derives the upstream
//! target (URL, forwarded headers, streaming flag) for the relay layer.

pub mod resolver;

pub use resolver::{provider_label, resolve_chat, resolve_models, ResolveError, RouteTarget};
