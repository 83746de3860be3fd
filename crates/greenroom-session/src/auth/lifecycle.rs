//! Token lifecycle state machine.
//!
//! Owns every credential entry in both tiers: login, role-scoped and global
//! logout, activity keep-alive, and proactive refresh with single-flight
//! guarding. No other component writes credential keys.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::identity::UserProfile;
use super::introspect::TokenIntrospector;
use super::tokens::{classify, refresh_threshold, Role, TokenKind, TokenState};
use super::AuthError;
use crate::api::AuthBackend;
use crate::store::{default_ttl, keys, DurableMirror, EntryStore};

/// Outcome of a `refresh_if_needed` call that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshStatus {
    /// The token is healthy (or there is nothing to refresh); no network
    /// call was made.
    NotNeeded,
    /// A new token was minted and applied.
    Refreshed {
        role: Role,
        profile: Option<UserProfile>,
    },
    /// A logout raced the refresh; the minted token was dropped rather
    /// than resurrecting a cleared session.
    Discarded,
}

pub struct TokenLifecycle {
    primary: Arc<dyn EntryStore>,
    mirror: Arc<DurableMirror>,
    introspector: Option<Box<dyn TokenIntrospector>>,
    default_ttl: Duration,
    refresh_threshold: Duration,
    // One guard per role so overlapping refresh calls collapse into a
    // single network request.
    user_refresh: Mutex<()>,
    host_refresh: Mutex<()>,
    // Bumped on every logout; an in-flight refresh result from an earlier
    // epoch is discarded instead of applied.
    epoch: AtomicU64,
}

impl TokenLifecycle {
    pub fn new(primary: Arc<dyn EntryStore>, mirror: Arc<DurableMirror>) -> Self {
        Self {
            primary,
            mirror,
            introspector: None,
            default_ttl: default_ttl(),
            refresh_threshold: refresh_threshold(),
            user_refresh: Mutex::new(()),
            host_refresh: Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Installs an optional token payload introspector; login uses it to
    /// clamp TTLs down to an expiry baked into the token itself.
    pub fn with_introspector(mut self, introspector: Box<dyn TokenIntrospector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    /// Overrides the default entry TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Overrides the time-to-expiry under which a token counts as expiring.
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    /// Writes a freshly issued token for `role`, along with the legacy
    /// copy, the role marker, and (when supplied) the refresh token. All
    /// credential writes are mirrored into the durable tier.
    pub fn login(
        &self,
        role: Role,
        token: &str,
        ttl: Option<Duration>,
        refresh_token: Option<&str>,
    ) {
        let ttl = self.clamped_ttl(token, ttl.unwrap_or(self.default_ttl));

        self.primary.set(role.token_key(), token, ttl);
        self.mirror.mirror(role.token_key(), token);

        // Legacy copy for code paths that don't distinguish roles.
        self.primary.set(keys::LEGACY_TOKEN, token, ttl);
        self.mirror.mirror(keys::LEGACY_TOKEN, token);

        // Last-activated role wins reads when both tokens are valid.
        self.primary.set(keys::ROLE, role.as_str(), ttl);

        if let Some(refresh) = refresh_token {
            self.primary.set(keys::REFRESH_TOKEN, refresh, self.default_ttl);
            self.mirror.mirror(keys::REFRESH_TOKEN, refresh);
        }

        info!(role = %role, "Session established");
    }

    /// The stored expiry stays authoritative; introspection only ever
    /// shortens a TTL, so opaque token formats keep the requested one.
    fn clamped_ttl(&self, token: &str, requested: Duration) -> Duration {
        let Some(introspector) = &self.introspector else {
            return requested;
        };
        match introspector.token_expiry(token) {
            Ok(expiry) => {
                let remaining = expiry - Utc::now();
                if remaining < requested {
                    debug!(
                        requested_secs = requested.num_seconds(),
                        embedded_secs = remaining.num_seconds(),
                        "Clamping TTL to the token's embedded expiry"
                    );
                    remaining.max(Duration::zero())
                } else {
                    requested
                }
            }
            Err(e) => {
                debug!(error = %e, "Token payload not introspectable, keeping requested TTL");
                requested
            }
        }
    }

    /// Removes one role's session without touching the other role. Clears
    /// the role marker (and the legacy copy of this role's token) when the
    /// role being logged out is the active one. Returns true when the
    /// marker was cleared, i.e. the active session ended.
    pub fn logout_role(&self, role: Role) -> bool {
        let removed = self.primary.get(role.token_key());
        self.primary.remove(role.token_key());
        self.mirror.remove(role.token_key());

        let marker_cleared = match self.primary.get(keys::ROLE) {
            Some(marker) if marker == role.as_str() => {
                self.primary.remove(keys::ROLE);
                true
            }
            _ => false,
        };

        // The legacy copy tracks the last login; drop it when it belongs
        // to the role being logged out.
        let legacy_is_stale = marker_cleared
            || matches!((&removed, self.primary.get(keys::LEGACY_TOKEN)),
                (Some(removed), Some(legacy)) if *removed == legacy);
        if legacy_is_stale {
            self.primary.remove(keys::LEGACY_TOKEN);
            self.mirror.remove(keys::LEGACY_TOKEN);
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        info!(role = %role, "Logged out role");
        marker_cleared
    }

    /// The only hard reset: wipes every entry from both tiers.
    pub fn logout_all(&self) {
        self.primary.clear();
        self.mirror.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        info!("Logged out all roles");
    }

    /// Activity keep-alive: rewrites every currently valid entry with the
    /// full TTL. No new token is minted, only the local expiry clock moves,
    /// so this is an idle-timeout mechanism rather than a grant renewal;
    /// pair with `validate` when the server's opinion matters.
    pub fn keep_alive(&self) {
        for kind in TokenKind::ALL {
            let key = kind.key();
            if !self.primary.has_valid(key) {
                continue;
            }
            if let Some(value) = self.primary.get(key) {
                self.primary.set(key, &value, self.default_ttl);
                self.mirror.mirror(key, &value);
            }
        }
        if let Some(marker) = self.primary.get(keys::ROLE) {
            self.primary.set(keys::ROLE, &marker, self.default_ttl);
        }
    }

    /// Lifecycle state of one storage key in the primary tier.
    pub fn state_of_key(&self, key: &str) -> TokenState {
        if !self.primary.contains(key) {
            return TokenState::Unset;
        }
        match self.primary.expires_at(key) {
            Some(expiry) => classify(expiry, Utc::now(), self.refresh_threshold),
            // A value with no expiry bookkeeping reads as expired.
            None => TokenState::Expired,
        }
    }

    /// Lifecycle state of a role's token, adopting the durable copy first
    /// when the primary tier has nothing (the returning-visitor path).
    pub fn role_state(&self, role: Role) -> TokenState {
        let state = self.state_of_key(role.token_key());
        if state != TokenState::Unset {
            return state;
        }
        if self.mirror.adopt(role.token_key(), &*self.primary).is_some() {
            return self.state_of_key(role.token_key());
        }
        TokenState::Unset
    }

    /// The last-activated role, from the marker when present, otherwise
    /// derived from which role tokens are currently valid.
    pub fn current_role(&self) -> Option<Role> {
        if let Some(marker) = self.primary.get(keys::ROLE) {
            return Role::parse(&marker);
        }
        let user = self.primary.has_valid(keys::USER_TOKEN);
        let host = self.primary.has_valid(keys::HOST_TOKEN);
        match (user, host) {
            (true, false) => Some(Role::User),
            (false, true) => Some(Role::Host),
            (true, true) => {
                // No marker but both tokens alive (e.g. after a restart).
                // The legacy copy tracks the last login; match it against
                // the host token, else fall back to the end-user role.
                let legacy = self.primary.get(keys::LEGACY_TOKEN);
                let host_token = self.primary.get(keys::HOST_TOKEN);
                if legacy.is_some() && legacy == host_token {
                    Some(Role::Host)
                } else {
                    Some(Role::User)
                }
            }
            (false, false) => None,
        }
    }

    /// Bearer credential for outgoing requests. Resolution order: valid
    /// legacy token, then the current role's token, then durable-tier
    /// adoption on a cold start.
    pub fn active_token(&self) -> Option<String> {
        if let Some(token) = self.primary.get(keys::LEGACY_TOKEN) {
            return Some(token);
        }
        if let Some(role) = self.current_role() {
            if let Some(token) = self.primary.get(role.token_key()) {
                return Some(token);
            }
        }
        self.mirror
            .adopt(keys::LEGACY_TOKEN, &*self.primary)
            .or_else(|| self.mirror.adopt(keys::USER_TOKEN, &*self.primary))
            .or_else(|| self.mirror.adopt(keys::HOST_TOKEN, &*self.primary))
    }

    /// Proactively refreshes the current role's token when it is expiring
    /// or expired and a refresh token is available.
    ///
    /// Safe under overlapping calls: a per-role guard collapses them into
    /// one network request, and the second caller re-checks state instead
    /// of issuing a duplicate. A logout during the flight discards the
    /// minted token. On failure the stored token is left untouched and the
    /// caller decides whether to force a logout.
    pub async fn refresh_if_needed<B: AuthBackend>(
        &self,
        backend: &B,
    ) -> Result<RefreshStatus, AuthError> {
        let Some(role) = self.current_role() else {
            return Ok(RefreshStatus::NotNeeded);
        };
        let state = self.role_state(role);
        if !matches!(state, TokenState::Expiring | TokenState::Expired) {
            return Ok(RefreshStatus::NotNeeded);
        }

        let refresh_token = self
            .primary
            .get(keys::REFRESH_TOKEN)
            .or_else(|| self.mirror.adopt(keys::REFRESH_TOKEN, &*self.primary));
        let Some(refresh_token) = refresh_token else {
            return if state == TokenState::Expired {
                Err(AuthError::TokenExpired)
            } else {
                // Still valid for a while; nothing actionable yet.
                Ok(RefreshStatus::NotNeeded)
            };
        };

        let guard = match role {
            Role::User => &self.user_refresh,
            Role::Host => &self.host_refresh,
        };
        let _flight = guard.lock().await;

        // Another caller may have completed the refresh while we waited.
        if self.role_state(role) == TokenState::Valid {
            return Ok(RefreshStatus::NotNeeded);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        debug!(role = %role, "Exchanging refresh token");
        let grant = backend.refresh(&refresh_token).await.map_err(|e| {
            warn!(role = %role, error = %e, "Token refresh failed");
            AuthError::RefreshFailed(e.to_string())
        })?;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(role = %role, "Discarding refresh result, session was logged out mid-flight");
            return Ok(RefreshStatus::Discarded);
        }

        let role = grant.role.unwrap_or(role);
        self.login(
            role,
            &grant.token,
            Some(Duration::seconds(grant.expires_in)),
            None,
        );
        Ok(RefreshStatus::Refreshed {
            role,
            profile: grant.user,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
