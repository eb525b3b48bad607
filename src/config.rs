use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

fn default_issue_path() -> String {
    "/api/v1/auth/token".to_string()
}

fn default_refresh_path() -> String {
    "/api/v1/auth/refresh".to_string()
}

fn default_expiry_skew_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Client configuration, loadable from a JSON file or from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL, e.g. `https://portal.example.com`.
    pub base_url: String,
    /// Credential-issue endpoint path (sign-in).
    #[serde(default = "default_issue_path")]
    pub issue_path: String,
    /// Credential-refresh endpoint path.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// Seconds before the real expiry at which the access token is treated
    /// as expired, so renewal happens before a request can race it.
    #[serde(default = "default_expiry_skew_secs")]
    pub expiry_skew_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional path for persisting the credential pair across restarts.
    #[serde(default)]
    pub persist_path: Option<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            issue_path: default_issue_path(),
            refresh_path: default_refresh_path(),
            expiry_skew_secs: default_expiry_skew_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            persist_path: None,
        }
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).context("reading config file")?;
        let config: Self = serde_json::from_str(&raw).context("parsing config JSON")?;
        Ok(config)
    }

    /// Build from environment variables. `PORTAL_API_URL` is required; the
    /// rest fall back to their defaults.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("PORTAL_API_URL").context("PORTAL_API_URL not set")?;
        let mut config = Self::new(base_url);

        if let Ok(path) = std::env::var("PORTAL_TOKEN_ISSUE_PATH") {
            config.issue_path = path;
        }
        if let Ok(path) = std::env::var("PORTAL_TOKEN_REFRESH_PATH") {
            config.refresh_path = path;
        }
        if let Ok(secs) = std::env::var("PORTAL_EXPIRY_SKEW_SECS") {
            config.expiry_skew_secs = secs.parse().context("parsing PORTAL_EXPIRY_SKEW_SECS")?;
        }
        if let Ok(secs) = std::env::var("PORTAL_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = secs.parse().context("parsing PORTAL_REQUEST_TIMEOUT_SECS")?;
        }
        if let Ok(path) = std::env::var("PORTAL_CREDENTIALS_FILE") {
            config.persist_path = Some(path);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parsing_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "base_url": "https://portal.example.com" }}"#).unwrap();

        let config = ClientConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.base_url, "https://portal.example.com");
        assert_eq!(config.issue_path, "/api/v1/auth/token");
        assert_eq!(config.refresh_path, "/api/v1/auth/refresh");
        assert_eq!(config.expiry_skew_secs, 5);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.persist_path.is_none());
    }

    #[test]
    fn test_config_parsing_full() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                "base_url": "http://localhost:8000",
                "refresh_path": "/auth/renew",
                "expiry_skew_secs": 10,
                "persist_path": "/tmp/portal-credentials.json"
            }}"#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.refresh_path, "/auth/renew");
        assert_eq!(config.expiry_skew_secs, 10);
        assert_eq!(
            config.persist_path.as_deref(),
            Some("/tmp/portal-credentials.json")
        );
    }

    #[test]
    fn test_config_missing_file() {
        let result = ClientConfig::from_file("/nonexistent/path/config.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{invalid json").unwrap();

        let result = ClientConfig::from_file(file.path().to_str().unwrap());
        assert!(result.is_err());
    }
}
