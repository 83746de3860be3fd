//! HTTP client for the Greenroom auth endpoints.
//!
//! Only two endpoints matter to the session core: the refresh exchange and
//! the opportunistic token validation check. Both sit behind the
//! `AuthBackend` trait so tests can inject fakes without a network.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::ApiError;
use crate::auth::{Role, UserProfile};

/// Refresh request timeout in seconds.
/// A refresh that hangs would wedge the in-flight guard, so fail fast.
const REFRESH_TIMEOUT_SECS: u64 = 10;

/// A minted access token returned by the refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshGrant {
    pub token: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// The auth endpoints the session core consumes.
pub trait AuthBackend: Send + Sync {
    /// Exchanges a refresh token for a new access token.
    fn refresh(&self, refresh_token: &str) -> impl Future<Output = Result<RefreshGrant>> + Send;

    /// Asks the server whether it still accepts a token, regardless of
    /// local expiry bookkeeping.
    fn validate(&self, token: &str) -> impl Future<Output = Result<bool>> + Send;
}

/// Auth API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, REFRESH_TIMEOUT_SECS)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }
}

impl AuthBackend for AuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant> {
        let url = format!("{}/auth/refresh", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .context("Failed to send refresh request")?;

        let response = Self::check_response(response).await?;

        response
            .json()
            .await
            .context("Failed to parse refresh response")
    }

    async fn validate(&self, token: &str) -> Result<bool> {
        let url = format!("{}/auth/validate", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send validation request")?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status.as_u16() == 401 {
            debug!("Server no longer accepts token");
            return Ok(false);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body).into())
    }
}

// ============================================================================
// Tests
// ============================================================================
