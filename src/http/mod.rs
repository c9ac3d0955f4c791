//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, dispatch)
//!     → request.rs (request ID, per-request context)
//!     → [routing resolves the upstream target]
//!     → [relay forwards and mirrors the reply]
//! ```

pub mod request;
pub mod server;

pub use request::{MakeRequestUuid, RelayContext, X_REQUEST_ID};
pub use server::HttpServer;
