//! Durable storage tier backed by the OS keychain.
//!
//! Each key maps to a keyring entry under a configurable service name, with
//! the expiration marker stored as a sibling entry. Keychain failures are
//! swallowed: a locked or absent keychain degrades the session to
//! "not persisted across restarts", never to a crash.

use chrono::{DateTime, Duration, Utc};
use keyring::Entry;
use tracing::debug;

use super::entry::{expires_key, keys, EntryStore};
use crate::auth::AuthError;

/// Key used by `probe` to verify the keychain accepts writes.
const PROBE_KEY: &str = "probe";

pub struct KeychainStore {
    service: String,
}

impl KeychainStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Round-trips a probe entry to confirm the keychain is usable.
    /// Callers log the outcome once at startup; the store itself stays
    /// silent afterwards apart from debug logs.
    pub fn probe(&self) -> Result<(), AuthError> {
        let entry =
            Entry::new(&self.service, PROBE_KEY).map_err(|_| AuthError::StorageUnavailable)?;
        entry
            .set_password("ok")
            .map_err(|_| AuthError::StorageUnavailable)?;
        let _ = entry.delete_credential();
        Ok(())
    }

    fn entry(&self, key: &str) -> Option<Entry> {
        match Entry::new(&self.service, key) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(key, error = %e, "Failed to open keychain entry");
                None
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        self.entry(key)?.get_password().ok()
    }

    fn write(&self, key: &str, value: &str) {
        if let Some(entry) = self.entry(key) {
            if let Err(e) = entry.set_password(value) {
                debug!(key, error = %e, "Failed to write keychain entry");
            }
        }
    }

    fn delete(&self, key: &str) {
        if let Some(entry) = self.entry(key) {
            // NoEntry is the common case on logout; not worth logging.
            let _ = entry.delete_credential();
        }
    }

    fn read_expiry(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.read(&expires_key(key))?;
        match raw.parse::<i64>() {
            Ok(ms) => DateTime::from_timestamp_millis(ms),
            Err(e) => {
                debug!(key, error = %e, "Unparsable expiration marker");
                None
            }
        }
    }
}

impl EntryStore for KeychainStore {
    fn get(&self, key: &str) -> Option<String> {
        if self.has_valid(key) {
            return self.read(key);
        }
        if self.contains(key) {
            self.remove(key);
            debug!(key, "Purged expired keychain entry");
        }
        None
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        let expiry = Utc::now() + ttl;
        self.write(key, value);
        self.write(&expires_key(key), &expiry.timestamp_millis().to_string());
    }

    fn remove(&self, key: &str) {
        self.delete(key);
        self.delete(&expires_key(key));
    }

    fn has_valid(&self, key: &str) -> bool {
        if self.read(key).is_none() {
            return false;
        }
        match self.read_expiry(key) {
            Some(expiry) => Utc::now() < expiry,
            None => false,
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.read(key).is_some()
    }

    fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.read_expiry(key)
    }

    fn clear(&self) {
        // The keychain cannot enumerate entries, so wipe the fixed key set.
        for key in keys::ALL {
            self.remove(key);
        }
    }
}
