//! The public session surface consumed by the rest of the application.
//!
//! `SessionManager` composes the storage tiers, the token lifecycle, and
//! the profile cache, and turns detected expiry into broadcast events so
//! the view layer can redirect to a login screen without this crate
//! knowing anything about routing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::Duration;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::identity::{ProfileCache, UserProfile};
use super::introspect::TokenIntrospector;
use super::lifecycle::{RefreshStatus, TokenLifecycle};
use super::tokens::{CurrentRole, Role, TokenState};
use super::AuthError;
use crate::api::{AuthBackend, AuthClient};
use crate::config::SessionConfig;
use crate::store::{DurableMirror, EntryStore, KeychainStore, MemoryStore};

/// Buffer size for the session event channel.
/// Expiry and refresh-failure events are rare; 16 leaves headroom for a
/// slow subscriber.
const EVENT_CHANNEL_SIZE: usize = 16;

/// A session-level signal the view layer reacts to, typically by
/// redirecting to the role-appropriate login view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum SessionEvent {
    /// A previously valid token was found expired on read.
    Expired { role: Role },
    /// A proactive refresh failed and the role was logged out.
    RefreshFailed { role: Role },
}

/// What `logout` applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutScope {
    Role(Role),
    All,
}

/// Optional extras supplied at login.
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    /// Token lifetime; the configured default applies when absent.
    pub ttl: Option<Duration>,
    pub refresh_token: Option<String>,
    pub profile: Option<UserProfile>,
}

pub struct SessionManager<B: AuthBackend = AuthClient> {
    lifecycle: TokenLifecycle,
    profile: ProfileCache,
    backend: B,
    events: broadcast::Sender<SessionEvent>,
    // Roles observed valid at least once, so expiry fires exactly one
    // event per session rather than one per read.
    seen_valid: Mutex<HashSet<Role>>,
}

impl SessionManager<AuthClient> {
    /// Production wiring: in-memory primary tier, OS keychain durable
    /// tier, HTTP auth backend.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let durable = KeychainStore::new(config.keychain_service.clone());
        if let Err(e) = durable.probe() {
            warn!(error = %e, "Durable tier unavailable, sessions will not survive a restart");
        }
        let backend =
            AuthClient::with_timeout(config.auth_base_url.clone(), config.refresh_timeout_secs)?;
        Ok(Self::with_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(durable),
            backend,
            config,
        ))
    }
}

impl<B: AuthBackend> SessionManager<B> {
    /// Assembles a manager from explicit tiers and backend. Tests inject
    /// in-memory tiers and fake backends here.
    pub fn with_parts(
        primary: Arc<dyn EntryStore>,
        durable: Arc<dyn EntryStore>,
        backend: B,
        config: &SessionConfig,
    ) -> Self {
        let mirror = Arc::new(DurableMirror::new(durable));
        let lifecycle = TokenLifecycle::new(primary.clone(), mirror.clone())
            .with_default_ttl(config.default_ttl())
            .with_refresh_threshold(config.refresh_threshold());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            lifecycle,
            profile: ProfileCache::new(primary, mirror),
            backend,
            events,
            seen_valid: Mutex::new(HashSet::new()),
        }
    }

    /// Installs a token payload introspector used to clamp login TTLs.
    pub fn with_introspector(mut self, introspector: Box<dyn TokenIntrospector>) -> Self {
        self.lifecycle = self.lifecycle.with_introspector(introspector);
        self
    }

    /// Session events: expiry detected on read, refresh failures.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Tracks state transitions and emits the one-shot expiry event when a
    /// previously valid role turns up expired.
    fn observe(&self, role: Role, state: TokenState) -> TokenState {
        let Ok(mut seen) = self.seen_valid.lock() else {
            return state;
        };
        match state {
            TokenState::Valid | TokenState::Expiring => {
                seen.insert(role);
            }
            TokenState::Expired => {
                if seen.remove(&role) {
                    warn!(role = %role, "Session expired");
                    let _ = self.events.send(SessionEvent::Expired { role });
                }
            }
            TokenState::Unset => {
                seen.remove(&role);
            }
        }
        state
    }

    fn role_state(&self, role: Role) -> TokenState {
        self.observe(role, self.lifecycle.role_state(role))
    }

    fn forget(&self, role: Role) {
        if let Ok(mut seen) = self.seen_valid.lock() {
            seen.remove(&role);
        }
    }

    /// With no argument, true when either role holds a live session; with
    /// a role, checks only that role.
    pub fn is_authenticated(&self, role: Option<Role>) -> bool {
        match role {
            Some(role) => self.role_state(role).is_authenticated(),
            None => {
                let user = self.role_state(Role::User);
                let host = self.role_state(Role::Host);
                user.is_authenticated() || host.is_authenticated()
            }
        }
    }

    /// Bearer credential for outgoing requests.
    pub fn token(&self) -> Option<String> {
        // Revalidate both roles first so expiry is noticed (and signalled)
        // on this read rather than silently returning nothing.
        let _ = self.role_state(Role::User);
        let _ = self.role_state(Role::Host);
        self.lifecycle.active_token()
    }

    pub fn login(&self, role: Role, token: &str, opts: LoginOptions) {
        self.lifecycle
            .login(role, token, opts.ttl, opts.refresh_token.as_deref());
        if let Some(profile) = &opts.profile {
            self.profile.set(profile);
        }
        if let Ok(mut seen) = self.seen_valid.lock() {
            seen.insert(role);
        }
    }

    pub fn logout(&self, scope: LogoutScope) {
        match scope {
            LogoutScope::Role(role) => {
                let was_active = self.lifecycle.logout_role(role);
                if was_active {
                    // The snapshot belonged to the session that just ended.
                    self.profile.clear();
                }
                self.forget(role);
            }
            LogoutScope::All => {
                self.lifecycle.logout_all();
                if let Ok(mut seen) = self.seen_valid.lock() {
                    seen.clear();
                }
            }
        }
    }

    pub fn current_role(&self) -> CurrentRole {
        self.lifecycle.current_role().into()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.profile.get()
    }

    /// Activity keep-alive: pushes the local expiry clock forward without
    /// minting a new token.
    pub fn keep_alive(&self) {
        self.lifecycle.keep_alive();
    }

    /// Proactive refresh, meant to run on a fixed interval and on entry
    /// into protected views. A failed refresh forces the role's logout and
    /// emits `SessionEvent::RefreshFailed` before surfacing the error.
    pub async fn refresh_if_needed(&self) -> Result<RefreshStatus, AuthError> {
        let role = self.lifecycle.current_role();
        match self.lifecycle.refresh_if_needed(&self.backend).await {
            Ok(RefreshStatus::Refreshed { role, profile }) => {
                if let Some(profile) = &profile {
                    self.profile.set(profile);
                }
                if let Ok(mut seen) = self.seen_valid.lock() {
                    seen.insert(role);
                }
                Ok(RefreshStatus::Refreshed { role, profile })
            }
            Ok(status) => Ok(status),
            Err(e) => {
                if let Some(role) = role {
                    warn!(role = %role, error = %e, "Refresh failed, forcing logout");
                    if self.lifecycle.logout_role(role) {
                        self.profile.clear();
                    }
                    self.forget(role);
                    let _ = self.events.send(SessionEvent::RefreshFailed { role });
                }
                Err(e)
            }
        }
    }

    /// Opportunistically asks the server whether the active token is still
    /// accepted, regardless of local bookkeeping. A rejection forces
    /// logout; an unreachable server keeps the local verdict.
    pub async fn validate_remote(&self) -> bool {
        let Some(token) = self.lifecycle.active_token() else {
            return false;
        };
        match self.backend.validate(&token).await {
            Ok(true) => true,
            Ok(false) => {
                if let Some(role) = self.lifecycle.current_role() {
                    warn!(role = %role, "Server rejected locally-valid token, forcing logout");
                    if self.lifecycle.logout_role(role) {
                        self.profile.clear();
                    }
                    self.forget(role);
                    let _ = self.events.send(SessionEvent::Expired { role });
                }
                false
            }
            Err(e) => {
                debug!(error = %e, "Validation endpoint unreachable, keeping local verdict");
                true
            }
        }
    }
}

impl<B: AuthBackend + 'static> SessionManager<B> {
    /// Spawns a background task that invokes `refresh_if_needed` on a
    /// fixed interval. Refresh failures are already handled (logout plus
    /// event); the task only logs them.
    pub fn start_auto_refresh(self: &Arc<Self>, period: StdDuration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a login flow
            // in progress can settle.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = manager.refresh_if_needed().await {
                    debug!(error = %e, "Scheduled refresh failed");
                }
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RefreshGrant;
    use crate::store::{keys, MemoryStore};
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct FakeBackend {
        refresh_calls: Arc<AtomicUsize>,
        refresh_fails: bool,
        validate_verdict: Option<bool>,
    }

    impl AuthBackend for FakeBackend {
        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshGrant> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.refresh_fails {
                return Err(anyhow!("refresh rejected"));
            }
            Ok(RefreshGrant {
                token: "tok-refreshed".into(),
                expires_in: 3600,
                user: Some(profile()),
                role: None,
            })
        }

        async fn validate(&self, _token: &str) -> Result<bool> {
            match self.validate_verdict {
                Some(verdict) => Ok(verdict),
                None => Err(anyhow!("validation unreachable")),
            }
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: 42,
            email: "dana@example.com".into(),
            display_name: "Dana".into(),
        }
    }

    fn manager_with(
        backend: FakeBackend,
    ) -> (SessionManager<FakeBackend>, Arc<MemoryStore>, Arc<MemoryStore>) {
        let primary = Arc::new(MemoryStore::new());
        let durable = Arc::new(MemoryStore::new());
        let manager = SessionManager::with_parts(
            primary.clone(),
            durable.clone(),
            backend,
            &SessionConfig::default(),
        );
        (manager, primary, durable)
    }

    fn manager() -> (SessionManager<FakeBackend>, Arc<MemoryStore>, Arc<MemoryStore>) {
        manager_with(FakeBackend::default())
    }

    /// Back-dates a credential in both tiers, as if the clock had advanced
    /// past its expiry.
    fn expire_everywhere(primary: &MemoryStore, durable: &MemoryStore, key: &str, value: &str) {
        primary.set(key, value, Duration::seconds(-1));
        durable.set(key, value, Duration::seconds(-1));
    }

    #[test]
    fn test_login_then_authenticated_with_token() {
        let (manager, _, _) = manager();
        manager.login(
            Role::User,
            "tok-A",
            LoginOptions {
                ttl: Some(Duration::seconds(3600)),
                ..Default::default()
            },
        );
        assert!(manager.is_authenticated(Some(Role::User)));
        assert_eq!(manager.token().as_deref(), Some("tok-A"));
        assert_eq!(manager.current_role(), CurrentRole::User);
    }

    #[test]
    fn test_expiry_reads_as_logged_out_and_fires_once() {
        let (manager, primary, durable) = manager();
        manager.login(Role::User, "tok-A", LoginOptions::default());
        let mut events = manager.subscribe();

        // The clock passes the token's expiry in both tiers.
        expire_everywhere(&primary, &durable, keys::USER_TOKEN, "tok-A");
        expire_everywhere(&primary, &durable, keys::LEGACY_TOKEN, "tok-A");
        expire_everywhere(&primary, &durable, keys::ROLE, "user");

        assert!(!manager.is_authenticated(Some(Role::User)));
        assert_eq!(manager.token(), None);
        // Several reads, exactly one notification.
        assert!(!manager.is_authenticated(None));
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Expired { role: Role::User }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_both_roles_coexist_last_activated_wins() {
        let (manager, _, _) = manager();
        manager.login(Role::User, "tok-A", LoginOptions::default());
        manager.login(Role::Host, "tok-B", LoginOptions::default());

        assert!(manager.is_authenticated(Some(Role::User)));
        assert!(manager.is_authenticated(Some(Role::Host)));
        assert_eq!(manager.current_role(), CurrentRole::Host);
        assert_eq!(manager.token().as_deref(), Some("tok-B"));
    }

    #[test]
    fn test_role_scoped_logout_spares_the_other_role() {
        let (manager, _, _) = manager();
        manager.login(Role::User, "tok-A", LoginOptions::default());
        manager.login(Role::Host, "tok-B", LoginOptions::default());

        manager.logout(LogoutScope::Role(Role::Host));

        assert!(manager.is_authenticated(Some(Role::User)));
        assert!(!manager.is_authenticated(Some(Role::Host)));
        assert_eq!(manager.current_role(), CurrentRole::User);
    }

    #[test]
    fn test_global_logout_clears_everything() {
        let (manager, primary, durable) = manager();
        manager.login(
            Role::User,
            "tok-A",
            LoginOptions {
                refresh_token: Some("rt-1".into()),
                profile: Some(profile()),
                ..Default::default()
            },
        );
        manager.login(Role::Host, "tok-B", LoginOptions::default());

        manager.logout(LogoutScope::All);

        assert!(!manager.is_authenticated(None));
        assert_eq!(manager.token(), None);
        assert_eq!(manager.current_user(), None);
        for key in keys::ALL {
            assert!(!primary.contains(key), "primary still holds {key}");
            assert!(!durable.contains(key), "durable still holds {key}");
        }
    }

    #[test]
    fn test_restart_adopts_durable_session() {
        let (manager, primary, _) = manager();
        manager.login(
            Role::User,
            "tok-A",
            LoginOptions {
                profile: Some(profile()),
                ..Default::default()
            },
        );

        // Simulate a restart: the ephemeral tier is wiped, keychain survives.
        primary.clear();

        assert!(manager.is_authenticated(Some(Role::User)));
        assert_eq!(manager.token().as_deref(), Some("tok-A"));
        assert_eq!(manager.current_user(), Some(profile()));
    }

    #[test]
    fn test_guest_by_default() {
        let (manager, _, _) = manager();
        assert_eq!(manager.current_role(), CurrentRole::Guest);
        assert!(!manager.is_authenticated(None));
        assert_eq!(manager.token(), None);
        assert_eq!(manager.current_user(), None);
    }

    #[tokio::test]
    async fn test_refresh_applies_grant_and_profile() {
        let (manager, _, _) = manager();
        manager.login(
            Role::User,
            "tok-old",
            LoginOptions {
                ttl: Some(Duration::minutes(5)),
                refresh_token: Some("rt-1".into()),
                ..Default::default()
            },
        );

        let status = manager.refresh_if_needed().await.unwrap();
        assert!(matches!(status, RefreshStatus::Refreshed { .. }));
        assert_eq!(manager.token().as_deref(), Some("tok-refreshed"));
        assert_eq!(manager.current_user(), Some(profile()));
    }

    #[tokio::test]
    async fn test_failed_refresh_forces_logout_with_event() {
        let backend = FakeBackend {
            refresh_fails: true,
            ..Default::default()
        };
        let (manager, _, _) = manager_with(backend);
        manager.login(
            Role::User,
            "tok-old",
            LoginOptions {
                ttl: Some(Duration::minutes(5)),
                refresh_token: Some("rt-1".into()),
                profile: Some(profile()),
                ..Default::default()
            },
        );
        let mut events = manager.subscribe();

        let err = manager.refresh_if_needed().await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed(_)));
        assert!(!manager.is_authenticated(Some(Role::User)));
        assert_eq!(manager.current_user(), None);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::RefreshFailed { role: Role::User }
        );
    }

    #[tokio::test]
    async fn test_remote_rejection_forces_logout() {
        let backend = FakeBackend {
            validate_verdict: Some(false),
            ..Default::default()
        };
        let (manager, _, _) = manager_with(backend);
        manager.login(Role::Host, "tok-B", LoginOptions::default());
        let mut events = manager.subscribe();

        assert!(!manager.validate_remote().await);
        assert!(!manager.is_authenticated(Some(Role::Host)));
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Expired { role: Role::Host }
        );
    }

    #[tokio::test]
    async fn test_unreachable_validation_keeps_local_verdict() {
        let (manager, _, _) = manager(); // validate errors by default
        manager.login(Role::User, "tok-A", LoginOptions::default());

        assert!(manager.validate_remote().await);
        assert!(manager.is_authenticated(Some(Role::User)));
    }

    #[test]
    fn test_keep_alive_extends_session() {
        let (manager, primary, _) = manager();
        manager.login(
            Role::User,
            "tok-A",
            LoginOptions {
                ttl: Some(Duration::hours(1)),
                ..Default::default()
            },
        );
        let before = primary.expires_at(keys::USER_TOKEN).unwrap();
        manager.keep_alive();
        assert!(primary.expires_at(keys::USER_TOKEN).unwrap() > before);
    }
}
