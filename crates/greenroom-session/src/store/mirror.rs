//! Best-effort write-through of credentials into the durable tier.
//!
//! The primary tier is assumed to be wiped whenever the process ends. The
//! mirror keeps independent copies of the credential keys so a returning
//! user with a still-valid token is not forced to re-authenticate, and
//! seeds the primary tier back via `adopt` on the next cold start.

use std::sync::Arc;

use tracing::debug;

use super::entry::{default_ttl, keys, EntryStore};

/// Keys eligible for mirroring. Ephemeral UI state never crosses tiers.
const MIRRORED: &[&str] = &[
    keys::LEGACY_TOKEN,
    keys::USER_TOKEN,
    keys::HOST_TOKEN,
    keys::REFRESH_TOKEN,
    keys::IDENTITY,
];

pub struct DurableMirror {
    durable: Arc<dyn EntryStore>,
}

impl DurableMirror {
    pub fn new(durable: Arc<dyn EntryStore>) -> Self {
        Self { durable }
    }

    /// Best-effort copy into the durable tier. Non-credential keys are
    /// rejected; storage failures are already swallowed by the tier itself.
    pub fn mirror(&self, key: &str, value: &str) {
        if !MIRRORED.contains(&key) {
            debug!(key, "Refusing to mirror non-credential key");
            return;
        }
        self.durable.set(key, value, default_ttl());
    }

    /// Migration read: seeds the primary tier from the durable copy.
    ///
    /// Idempotent: when the primary tier already holds a valid value it is
    /// returned untouched, so repeated calls never regress a freshly-issued
    /// token to a stale mirrored one.
    pub fn adopt(&self, key: &str, primary: &dyn EntryStore) -> Option<String> {
        if primary.has_valid(key) {
            return primary.get(key);
        }
        let value = self.durable.get(key)?;
        debug!(key, "Adopting durable entry into primary tier");
        primary.set(key, &value, default_ttl());
        Some(value)
    }

    /// Removes the durable copy of a key.
    pub fn remove(&self, key: &str) {
        self.durable.remove(key);
    }

    /// Wipes the durable tier.
    pub fn clear(&self) {
        self.durable.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn mirror_over_memory() -> (DurableMirror, MemoryStore) {
        (
            DurableMirror::new(Arc::new(MemoryStore::new())),
            MemoryStore::new(),
        )
    }

    #[test]
    fn test_adopt_seeds_primary_with_fresh_ttl() {
        let (mirror, primary) = mirror_over_memory();
        mirror.mirror(keys::USER_TOKEN, "tok-C");

        assert!(!primary.contains(keys::USER_TOKEN));
        let adopted = mirror.adopt(keys::USER_TOKEN, &primary);
        assert_eq!(adopted.as_deref(), Some("tok-C"));
        assert!(primary.has_valid(keys::USER_TOKEN));
    }

    #[test]
    fn test_adopt_is_idempotent() {
        let (mirror, primary) = mirror_over_memory();
        mirror.mirror(keys::USER_TOKEN, "stale-mirrored");
        primary.set(keys::USER_TOKEN, "fresh", Duration::hours(1));
        let before = primary.expires_at(keys::USER_TOKEN).unwrap();

        let adopted = mirror.adopt(keys::USER_TOKEN, &primary);

        // The fresh primary value wins and its expiry is untouched.
        assert_eq!(adopted.as_deref(), Some("fresh"));
        assert_eq!(primary.get(keys::USER_TOKEN).as_deref(), Some("fresh"));
        assert_eq!(primary.expires_at(keys::USER_TOKEN).unwrap(), before);
    }

    #[test]
    fn test_adopt_ignores_expired_durable_copy() {
        let durable = MemoryStore::new();
        durable.set(keys::USER_TOKEN, "tok-old", Duration::seconds(-1));
        let mirror = DurableMirror::new(Arc::new(durable));
        let primary = MemoryStore::new();

        assert_eq!(mirror.adopt(keys::USER_TOKEN, &primary), None);
        assert!(!primary.contains(keys::USER_TOKEN));
    }

    #[test]
    fn test_mirror_rejects_non_credential_keys() {
        let durable = Arc::new(MemoryStore::new());
        let mirror = DurableMirror::new(durable.clone());

        mirror.mirror("selected_tab", "events");

        assert!(!durable.contains("selected_tab"));
    }
}
