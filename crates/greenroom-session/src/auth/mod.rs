//! Authentication module for role-aware sessions and token lifecycle.
//!
//! This module provides:
//! - `TokenLifecycle`: per-role token state with proactive refresh
//! - `ProfileCache`: cached profile snapshot for the active principal
//! - `SessionManager`: the public surface the application consumes
//!
//! Two principal kinds (end-user and host) can hold sessions at the same
//! time; the last-activated role wins ambiguous reads.

pub mod error;
pub mod identity;
pub mod introspect;
pub mod lifecycle;
pub mod session;
pub mod tokens;

pub use error::AuthError;
pub use identity::{ProfileCache, UserProfile};
pub use introspect::{JwtIntrospector, TokenIntrospector};
pub use lifecycle::{RefreshStatus, TokenLifecycle};
pub use session::{LoginOptions, LogoutScope, SessionEvent, SessionManager};
pub use tokens::{
    CurrentRole, Role, TokenKind, TokenState, REFRESH_THRESHOLD_MINUTES,
};
