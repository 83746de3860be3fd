use thiserror::Error;

/// Session-level failures. Storage problems never reach the UI as errors
/// (authentication fails closed instead), so most of these surface only
/// from `refresh_if_needed` and the startup probe.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Storage tier unavailable")]
    StorageUnavailable,

    #[error("Token expired and no refresh token is available")]
    TokenExpired,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Token could not be parsed: {0}")]
    MalformedToken(String),
}
