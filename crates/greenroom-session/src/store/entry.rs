//! The storage tier contract shared by the ephemeral and durable backends.
//!
//! Every value carries a companion expiration entry under `<key>_expires`
//! (unix milliseconds). An entry whose expiration has passed is absent as
//! far as every reader is concerned, even if the backend still physically
//! holds it; `get` lazily purges such pairs.

use chrono::{DateTime, Duration, Utc};

/// Default entry lifetime when a caller does not supply one (24 hours).
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Suffix for the companion key holding an entry's expiration timestamp.
pub const EXPIRES_SUFFIX: &str = "_expires";

/// Storage keys shared by both tiers.
pub mod keys {
    /// Generic token kept for code paths that don't distinguish roles.
    pub const LEGACY_TOKEN: &str = "token";
    /// Bearer credential for the end-user principal.
    pub const USER_TOKEN: &str = "user_token";
    /// Bearer credential for the host principal.
    pub const HOST_TOKEN: &str = "host_token";
    /// Used to mint a new access token without re-authenticating.
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// Marker for the last-activated role.
    pub const ROLE: &str = "role";
    /// Denormalized profile blob for the active principal.
    pub const IDENTITY: &str = "identity";

    /// Every key either tier may hold. Used for full wipes of backends
    /// that cannot enumerate their own entries.
    pub const ALL: &[&str] = &[
        LEGACY_TOKEN,
        USER_TOKEN,
        HOST_TOKEN,
        REFRESH_TOKEN,
        ROLE,
        IDENTITY,
    ];
}

/// One keyed storage tier with per-entry expiration.
///
/// All operations degrade to no-ops (writes) or `None`/`false` (reads) when
/// the backing storage is unavailable; callers treat that as "logged out"
/// rather than an error.
pub trait EntryStore: Send + Sync {
    /// Returns the value iff it is present and unexpired. Finding an
    /// expired pair purges it.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes the value with `expires_at = now + ttl`. Rewriting the same
    /// value still pushes the expiration forward, which keep-alive relies on.
    fn set(&self, key: &str, value: &str, ttl: Duration);

    /// Deletes the value and its expiration marker.
    fn remove(&self, key: &str);

    /// True iff a value is present and its expiration is in the future.
    /// This is the only gate other components trust; it is consulted on
    /// every read, never cached.
    fn has_valid(&self, key: &str) -> bool;

    /// Raw presence check, ignoring expiry. Distinguishes an expired entry
    /// from one that was never written or was explicitly removed.
    fn contains(&self, key: &str) -> bool;

    /// The stored expiration timestamp, if any, regardless of whether it
    /// has passed.
    fn expires_at(&self, key: &str) -> Option<DateTime<Utc>>;

    /// Wipes the entire tier.
    fn clear(&self);
}

/// Default TTL as a duration.
pub fn default_ttl() -> Duration {
    Duration::hours(DEFAULT_TTL_HOURS)
}

/// Companion key holding `key`'s expiration.
pub fn expires_key(key: &str) -> String {
    format!("{}{}", key, EXPIRES_SUFFIX)
}
