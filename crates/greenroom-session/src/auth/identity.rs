//! Cached profile snapshot for the active principal.
//!
//! Purely a cache to avoid re-fetching profile data on every render; the
//! backend stays authoritative. Mirrored into the durable tier so a
//! returning visitor sees a name before the profile re-fetch completes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{default_ttl, keys, DurableMirror, EntryStore};

/// Denormalized profile blob associated with the active principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub display_name: String,
}

pub struct ProfileCache {
    primary: Arc<dyn EntryStore>,
    mirror: Arc<DurableMirror>,
}

impl ProfileCache {
    pub fn new(primary: Arc<dyn EntryStore>, mirror: Arc<DurableMirror>) -> Self {
        Self { primary, mirror }
    }

    /// Stores the snapshot and mirrors it for returning visitors.
    pub fn set(&self, profile: &UserProfile) {
        let blob = match serde_json::to_string(profile) {
            Ok(blob) => blob,
            Err(e) => {
                debug!(error = %e, "Failed to serialize profile snapshot");
                return;
            }
        };
        self.primary.set(keys::IDENTITY, &blob, default_ttl());
        self.mirror.mirror(keys::IDENTITY, &blob);
    }

    /// Reads the snapshot, adopting the durable copy on a cold start.
    /// An unparsable blob reads as absent.
    pub fn get(&self) -> Option<UserProfile> {
        let blob = self
            .primary
            .get(keys::IDENTITY)
            .or_else(|| self.mirror.adopt(keys::IDENTITY, &*self.primary))?;
        match serde_json::from_str(&blob) {
            Ok(profile) => Some(profile),
            Err(e) => {
                debug!(error = %e, "Discarding unparsable profile snapshot");
                None
            }
        }
    }

    /// Drops the snapshot from both tiers.
    pub fn clear(&self) {
        self.primary.remove(keys::IDENTITY);
        self.mirror.remove(keys::IDENTITY);
    }
}

// ============================================================================
// Tests
// ============================================================================
