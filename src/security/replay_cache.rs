//! Replay protection for agent requests.
//!
//! Remembers nonces of authenticated requests for a TTL window. In-memory
//! only; resets on restart. The TTL is kept at least as long as the
//! timestamp window so a nonce cannot expire while its timestamp is still
//! acceptable.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_NONCE_TTL_SECS: u64 = 120;
pub const DEFAULT_NONCE_CAPACITY: usize = 100_000;

/// Outcome of presenting a nonce to a [`ReplayStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceVerdict {
    /// Never seen inside the TTL window; now recorded.
    Fresh,
    /// Already recorded inside the TTL window.
    Replayed,
    /// The store is full of live entries; the nonce was not recorded.
    CapacityExhausted,
}

/// Shared nonce memory consulted by the agent protocol.
///
/// Injected into the authenticator so tests can swap it out and a
/// multi-process deployment can back it with a shared cache.
pub trait ReplayStore: Send + Sync + std::fmt::Debug {
    fn check_and_record(&self, nonce: &str) -> NonceVerdict;
}

pub struct ReplayCache {
    seen: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    capacity: usize,
}

impl ReplayCache {
    pub fn new() -> Self {
        Self::with_limits(
            Duration::from_secs(DEFAULT_NONCE_TTL_SECS),
            DEFAULT_NONCE_CAPACITY,
        )
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    /// Evicts expired entries, then records `nonce` if it is new and there is room.
    ///
    /// A full cache refuses new nonces instead of evicting live ones.
    pub fn check_and_record_at(&self, nonce: &str, now: Instant) -> NonceVerdict {
        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        seen.retain(|_, first_seen| now.saturating_duration_since(*first_seen) < self.ttl);

        if seen.contains_key(nonce) {
            return NonceVerdict::Replayed;
        }
        if seen.len() >= self.capacity {
            return NonceVerdict::CapacityExhausted;
        }
        seen.insert(nonce.to_string(), now);
        NonceVerdict::Fresh
    }

    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

impl ReplayStore for ReplayCache {
    fn check_and_record(&self, nonce: &str) -> NonceVerdict {
        self.check_and_record_at(nonce, Instant::now())
    }
}

impl std::fmt::Debug for ReplayCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
