//! Realtime WebSocket proxy subsystem.
//!
//! One inbound live session is paired 1:1 with one companion connection to
//! the configured downstream endpoint. The registry is the single point of
//! truth for which sessions exist; each session owns its companion socket.

pub mod registry;
pub mod session;

pub use registry::{SessionKey, SessionRegistry, SessionState};
pub use session::{CompanionParams, DuplexSession, LiveError};
