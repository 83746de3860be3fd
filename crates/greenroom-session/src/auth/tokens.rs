//! Role and token vocabulary plus the expiry state classifier.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;

/// Time before expiry at which a token counts as expiring and a proactive
/// refresh should run (10 minutes).
pub const REFRESH_THRESHOLD_MINUTES: i64 = 10;

/// A principal kind the backend can issue a credential for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum Role {
    User,
    Host,
}

impl Role {
    /// Storage key for this role's bearer token.
    pub fn token_key(&self) -> &'static str {
        match self {
            Role::User => keys::USER_TOKEN,
            Role::Host => keys::HOST_TOKEN,
        }
    }

    /// Marker value written to the `role` key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Host => "host",
        }
    }

    /// Parses a stored marker value. Unknown markers read as absent rather
    /// than failing, since another process may share the durable tier.
    pub fn parse(marker: &str) -> Option<Self> {
        match marker {
            "user" => Some(Role::User),
            "host" => Some(Role::Host),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public projection of the role marker for consumers that need a
/// three-valued answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum CurrentRole {
    Guest,
    User,
    Host,
}

impl From<Option<Role>> for CurrentRole {
    fn from(role: Option<Role>) -> Self {
        match role {
            None => CurrentRole::Guest,
            Some(Role::User) => CurrentRole::User,
            Some(Role::Host) => CurrentRole::Host,
        }
    }
}

/// Stored credential kinds, keyed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Legacy,
    User,
    Host,
    Refresh,
}

impl TokenKind {
    pub const ALL: [TokenKind; 4] = [
        TokenKind::Legacy,
        TokenKind::User,
        TokenKind::Host,
        TokenKind::Refresh,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            TokenKind::Legacy => keys::LEGACY_TOKEN,
            TokenKind::User => keys::USER_TOKEN,
            TokenKind::Host => keys::HOST_TOKEN,
            TokenKind::Refresh => keys::REFRESH_TOKEN,
        }
    }
}

/// Per-token lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No entry, or the entry was explicitly removed.
    Unset,
    /// Unexpired with time-to-expiry above the refresh threshold.
    Valid,
    /// Unexpired but inside the refresh threshold; a proactive refresh
    /// should run.
    Expiring,
    /// Past expiry; reads behave as `Unset`.
    Expired,
}

impl TokenState {
    /// Whether this state still counts as an authenticated session.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, TokenState::Valid | TokenState::Expiring)
    }
}

/// Default refresh threshold as a duration.
pub fn refresh_threshold() -> Duration {
    Duration::minutes(REFRESH_THRESHOLD_MINUTES)
}

/// Classifies a stored expiry against `now`. The caller maps a missing
/// value to `Unset` and a value with no expiry bookkeeping to `Expired`.
pub fn classify(expires_at: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> TokenState {
    if expires_at <= now {
        TokenState::Expired
    } else if expires_at - now <= threshold {
        TokenState::Expiring
    } else {
        TokenState::Valid
    }
}

// ============================================================================
// Tests
// ============================================================================
