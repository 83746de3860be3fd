//! REST client module for the Greenroom auth endpoints.
//!
//! This module provides the `AuthClient` used for token refresh and
//! server-side token validation, behind the `AuthBackend` trait so the
//! session core never depends on a live network in tests.

pub mod client;
pub mod error;

pub use client::{AuthBackend, AuthClient, RefreshGrant};
pub use error::ApiError;
