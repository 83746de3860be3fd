//! Session configuration management.
//!
//! Covers the knobs the session core needs: the auth API base URL, entry
//! TTLs, the proactive-refresh threshold, the refresh request timeout, and
//! the keychain service name for the durable tier.
//!
//! Configuration is stored at `~/.config/greenroom/session.json`.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::auth::REFRESH_THRESHOLD_MINUTES;
use crate::store::DEFAULT_TTL_HOURS;

/// Application name used for config directory paths
const APP_NAME: &str = "greenroom";

/// Config file name
const CONFIG_FILE: &str = "session.json";

/// Default base URL for the auth endpoints
const DEFAULT_AUTH_BASE_URL: &str = "https://api.greenroom.app";

/// Refresh request timeout in seconds; a hung refresh would wedge the
/// in-flight guard, so keep this short.
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub auth_base_url: String,
    pub default_ttl_hours: i64,
    pub refresh_threshold_minutes: i64,
    pub refresh_timeout_secs: u64,
    pub keychain_service: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            default_ttl_hours: DEFAULT_TTL_HOURS,
            refresh_threshold_minutes: REFRESH_THRESHOLD_MINUTES,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            keychain_service: APP_NAME.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::hours(self.default_ttl_hours)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::minutes(self.refresh_threshold_minutes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.default_ttl(), Duration::hours(24));
        assert_eq!(config.refresh_threshold(), Duration::minutes(10));
        assert_eq!(config.keychain_service, "greenroom");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"auth_base_url": "https://staging.greenroom.app"}"#)
                .expect("partial config should parse");
        assert_eq!(config.auth_base_url, "https://staging.greenroom.app");
        assert_eq!(config.refresh_timeout_secs, 10);
        assert_eq!(config.default_ttl_hours, 24);
    }
}
