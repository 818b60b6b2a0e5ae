//! Key-value store abstraction for cross-request state.
//!
//! Everything mutable that outlives a single request (authentication state,
//! nonces, saved URLs, access maps) lives behind [`KeyValueStore`]. The
//! contract is deliberately minimal: single-key set/get/del with a per-key
//! TTL and no atomicity across operations. In particular there is no
//! delete-if-matches primitive, which is why the nonce consume in
//! [`crate::oidc::flow`] is a non-atomic read-then-delete pair.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

pub mod memory;

pub use memory::MemoryStore;

/// TTL for the per-attempt `state` entry
pub const STATE_TTL: Duration = Duration::from_secs(600);

/// TTL for the per-attempt `nonce` entry (also deleted on read)
pub const NONCE_TTL: Duration = Duration::from_secs(600);

/// TTL for the saved original URL
pub const REDIRECT_TTL: Duration = Duration::from_secs(600);

/// TTL for a session's access map (3 days)
pub const ACCESS_TTL: Duration = Duration::from_secs(3 * 24 * 3600);

/// Minimal TTL'd key-value contract. Implementations must be safe for
/// concurrent use; no guarantees are required beyond single-key operations.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch the live value under `key`, or `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Drop `key`. Deleting an absent key is not an error.
    async fn del(&self, key: &str) -> Result<()>;
}

/// Key naming for the gateway's store entries
pub mod keys {
    /// Per-attempt CSRF state, keyed by session
    #[must_use]
    pub fn state(session: &str) -> String {
        format!("state:{session}")
    }

    /// Per-attempt nonce, keyed by session
    #[must_use]
    pub fn nonce(session: &str) -> String {
        format!("nonce:{session}")
    }

    /// Originally requested URL, keyed by the attempt's state value
    #[must_use]
    pub fn redirect(state: &str) -> String {
        format!("REDIRECT:{state}")
    }

    /// Access map, keyed by session
    #[must_use]
    pub fn access(session: &str) -> String {
        format!("ACCESS:{session}")
    }
}
