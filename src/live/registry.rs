//! Live session registry.
//!
//! # Responsibilities
//! - Mint collision-free session keys at accept time
//! - Create-if-absent insertion: the single synchronization point deciding
//!   whether a companion connection may be opened for a session
//! - Track per-session lifecycle state for teardown coordination
//!
//! # Design Decisions
//! - `Arc<DashMap>` wrapper component, cloned into handlers
//! - Keys pair the client address with a process-unique serial, never
//!   incidental object identity

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Process-unique identifier for one inbound live session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    addr: SocketAddr,
    serial: u64,
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.addr, self.serial)
    }
}

/// Lifecycle of a duplex session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Inbound handshake validated; no companion yet.
    Accepted = 0,
    /// Companion connection in flight.
    Connecting = 1,
    /// Both legs open, frames relaying.
    Open = 2,
    /// Torn down after an open session ended.
    Closed = 3,
    /// Terminal failure from `Connecting` or `Open`.
    Failed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Accepted,
            1 => SessionState::Connecting,
            2 => SessionState::Open,
            3 => SessionState::Closed,
            _ => SessionState::Failed,
        }
    }
}

/// Shared per-session bookkeeping.
///
/// `torn_down` is the single-fire teardown gate: either leg's close/error
/// path may trigger teardown, but only the first transition acts.
#[derive(Debug)]
pub struct SessionHandle {
    key: SessionKey,
    state: AtomicU8,
    torn_down: AtomicBool,
}

impl SessionHandle {
    fn new(key: SessionKey) -> Self {
        Self {
            key,
            state: AtomicU8::new(SessionState::Accepted as u8),
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Claim the right to tear the session down. Returns true for exactly
    /// one caller per session lifetime.
    pub fn begin_teardown(&self) -> bool {
        self.torn_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Concurrent map of live sessions, the single point of truth for
/// "does a companion exist for this session".
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<DashMap<SessionKey, Arc<SessionHandle>>>,
    serial: Arc<AtomicU64>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a key for a freshly accepted connection. The serial makes keys
    /// collision-free for the process lifetime even when one client address
    /// opens many sessions.
    pub fn mint_key(&self, addr: SocketAddr) -> SessionKey {
        SessionKey {
            addr,
            serial: self.serial.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Atomic create-if-absent. Returns the new handle, or `None` when a
    /// session for this key already exists — the caller must not open a
    /// second companion.
    pub fn insert(&self, key: SessionKey) -> Option<Arc<SessionHandle>> {
        match self.inner.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let handle = Arc::new(SessionHandle::new(key));
                vacant.insert(handle.clone());
                Some(handle)
            }
        }
    }

    /// Remove a session, returning its handle if it was present.
    pub fn remove(&self, key: &SessionKey) -> Option<Arc<SessionHandle>> {
        self.inner.remove(key).map(|(_, handle)| handle)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
