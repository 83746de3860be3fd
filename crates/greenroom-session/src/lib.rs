//! Session core for the Greenroom client.
//!
//! Tracks authentication state for two independent principal kinds (an
//! end-user and a host), stores credentials across an ephemeral and a
//! durable storage tier with per-entry expiration, migrates values
//! between tiers on cold starts, and proactively refreshes tokens before
//! they lapse.
//!
//! The view layers only ever touch [`SessionManager`]: obtain a bearer
//! credential for outgoing requests, log in and out, and subscribe to
//! expiry events to redirect to a login view.

pub mod api;
pub mod auth;
pub mod config;
pub mod store;

pub use api::{AuthBackend, AuthClient, ApiError, RefreshGrant};
pub use auth::{
    AuthError, CurrentRole, JwtIntrospector, LoginOptions, LogoutScope, ProfileCache,
    RefreshStatus, Role, SessionEvent, SessionManager, TokenIntrospector, TokenLifecycle,
    TokenState, UserProfile,
};
pub use config::SessionConfig;
pub use store::{DurableMirror, EntryStore, KeychainStore, MemoryStore};
