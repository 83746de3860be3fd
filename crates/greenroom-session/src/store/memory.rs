//! Ephemeral in-process storage tier.
//!
//! Entries live for the lifetime of the process and vanish on exit; the
//! durable tier exists to survive that. This is the primary tier the
//! session manager works against, and doubles as the injectable fake for
//! tests of the durable side.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::entry::{expires_key, EntryStore};

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_expiry(map: &HashMap<String, String>, key: &str) -> Option<DateTime<Utc>> {
        let raw = map.get(&expires_key(key))?;
        match raw.parse::<i64>() {
            Ok(ms) => DateTime::from_timestamp_millis(ms),
            Err(e) => {
                debug!(key, error = %e, "Unparsable expiration marker");
                None
            }
        }
    }

    fn valid(map: &HashMap<String, String>, key: &str) -> bool {
        if !map.contains_key(key) {
            return false;
        }
        match Self::read_expiry(map, key) {
            Some(expiry) => Utc::now() < expiry,
            // Value without expiry bookkeeping reads as expired.
            None => false,
        }
    }
}

impl EntryStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let mut map = self.entries.lock().ok()?;
        if Self::valid(&map, key) {
            return map.get(key).cloned();
        }
        if map.contains_key(key) {
            // Lazy expiration: purge the stale pair on read.
            map.remove(key);
            map.remove(&expires_key(key));
            debug!(key, "Purged expired entry");
        }
        None
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        let Ok(mut map) = self.entries.lock() else {
            return;
        };
        let expiry = Utc::now() + ttl;
        map.insert(key.to_string(), value.to_string());
        map.insert(expires_key(key), expiry.timestamp_millis().to_string());
    }

    fn remove(&self, key: &str) {
        let Ok(mut map) = self.entries.lock() else {
            return;
        };
        map.remove(key);
        map.remove(&expires_key(key));
    }

    fn has_valid(&self, key: &str) -> bool {
        match self.entries.lock() {
            Ok(map) => Self::valid(&map, key),
            Err(_) => false,
        }
    }

    fn contains(&self, key: &str) -> bool {
        match self.entries.lock() {
            Ok(map) => map.contains_key(key),
            Err(_) => false,
        }
    }

    fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let map = self.entries.lock().ok()?;
        Self::read_expiry(&map, key)
    }

    fn clear(&self) {
        if let Ok(mut map) = self.entries.lock() {
            map.clear();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let store = MemoryStore::new();
        store.set("token", "tok-A", Duration::hours(1));
        assert_eq!(store.get("token").as_deref(), Some("tok-A"));
        assert!(store.has_valid("token"));
    }

    #[test]
    fn test_expiration_is_authoritative_over_presence() {
        let store = MemoryStore::new();
        store.set("token", "tok-A", Duration::seconds(-1));
        // Physically present, but every read path treats it as absent.
        assert!(store.contains("token"));
        assert!(!store.has_valid("token"));
        assert_eq!(store.get("token"), None);
    }

    #[test]
    fn test_get_purges_expired_pair() {
        let store = MemoryStore::new();
        store.set("token", "tok-A", Duration::seconds(-1));
        assert_eq!(store.get("token"), None);
        assert!(!store.contains("token"));
        assert_eq!(store.expires_at("token"), None);
    }

    #[test]
    fn test_rewrite_refreshes_expiry() {
        let store = MemoryStore::new();
        store.set("token", "tok-A", Duration::hours(1));
        let first = store.expires_at("token").expect("expiry present");
        store.set("token", "tok-A", Duration::hours(2));
        let second = store.expires_at("token").expect("expiry present");
        assert!(second > first);
        assert_eq!(store.get("token").as_deref(), Some("tok-A"));
    }

    #[test]
    fn test_remove_deletes_both_keys() {
        let store = MemoryStore::new();
        store.set("token", "tok-A", Duration::hours(1));
        store.remove("token");
        assert!(!store.contains("token"));
        assert_eq!(store.expires_at("token"), None);
    }

    #[test]
    fn test_clear_wipes_tier() {
        let store = MemoryStore::new();
        store.set("token", "tok-A", Duration::hours(1));
        store.set("user_token", "tok-B", Duration::hours(1));
        store.clear();
        assert!(!store.contains("token"));
        assert!(!store.contains("user_token"));
    }
}
