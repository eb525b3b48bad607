use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::security::claims::token_expiry;

/// The access/refresh token pair with derived expiry timestamps.
///
/// Expiries are always recomputed from the tokens' embedded claims when a
/// pair is stored; a `None` expiry means the token could not be decoded and
/// is treated as already expired.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expiry: Option<DateTime<Utc>>,
    pub refresh_expiry: Option<DateTime<Utc>>,
}

impl Credential {
    fn from_tokens(access_token: String, refresh_token: String) -> Self {
        let access_expiry = token_expiry(&access_token);
        if access_expiry.is_none() {
            warn!("access token has no decodable expiry, treating as expired");
        }
        let refresh_expiry = token_expiry(&refresh_token);
        if refresh_expiry.is_none() {
            warn!("refresh token has no decodable expiry, treating as expired");
        }
        Self {
            access_token,
            refresh_token,
            access_expiry,
            refresh_expiry,
        }
    }
}

/// On-disk form: tokens only, expiries re-derived on load.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedCredential {
    access_token: String,
    refresh_token: String,
}

/// Credential store with atomic swap capability and optional file persistence.
///
/// The store is the only mutable shared state in the access layer. It is
/// written by the refresh coordinator and the explicit sign-in/sign-out
/// paths, and read by everyone. It never performs network IO; persistence
/// failures log a warning and are otherwise ignored.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<Credential>>>,
    persist_path: Option<PathBuf>,
}

impl CredentialStore {
    /// Create an in-memory store with no credential.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            persist_path: None,
        }
    }

    /// Create a store backed by a JSON file, loading any previously
    /// persisted pair. A missing or unreadable file starts the store empty.
    pub fn with_persistence(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<PersistedCredential>(&raw) {
                Ok(saved) => {
                    debug!(path = %path.display(), "loaded persisted credential");
                    Some(Credential::from_tokens(saved.access_token, saved.refresh_token))
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "persisted credential unreadable, starting empty");
                    None
                }
            },
            Err(_) => None,
        };

        Self {
            inner: Arc::new(RwLock::new(initial)),
            persist_path: Some(path),
        }
    }

    /// Get the current credential, if any.
    pub async fn get(&self) -> Option<Credential> {
        self.inner.read().await.clone()
    }

    /// Atomically replace the credential pair, recomputing both expiries
    /// from the tokens' embedded claims.
    pub async fn set(&self, access_token: String, refresh_token: String) {
        let cred = Credential::from_tokens(access_token, refresh_token);
        {
            let mut guard = self.inner.write().await;
            *guard = Some(cred.clone());
        }
        debug!(
            access_expiry = ?cred.access_expiry,
            refresh_expiry = ?cred.refresh_expiry,
            "credential stored"
        );
        self.persist(Some(&cred));
    }

    /// True when the access token is absent, undecodable, or within `skew`
    /// of its expiry. A positive skew makes expiry detection proactive.
    pub async fn is_access_expired(&self, skew: Duration) -> bool {
        let guard = self.inner.read().await;
        match guard.as_ref().and_then(|c| c.access_expiry) {
            Some(expiry) => {
                let skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());
                Utc::now() + skew >= expiry
            }
            None => true,
        }
    }

    /// True when the refresh token is absent, undecodable, or expired.
    /// No skew: refresh failure is terminal, there is nothing to pre-empt.
    pub async fn is_refresh_expired(&self) -> bool {
        let guard = self.inner.read().await;
        match guard.as_ref().and_then(|c| c.refresh_expiry) {
            Some(expiry) => Utc::now() >= expiry,
            None => true,
        }
    }

    /// Drop the credential (sign-out or unrecoverable session loss).
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        if guard.take().is_some() {
            debug!("credential cleared");
        }
        drop(guard);
        self.persist(None);
    }

    fn persist(&self, cred: Option<&Credential>) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let result = match cred {
            Some(cred) => {
                let saved = PersistedCredential {
                    access_token: cred.access_token.clone(),
                    refresh_token: cred.refresh_token.clone(),
                };
                serde_json::to_string(&saved)
                    .map_err(std::io::Error::other)
                    .and_then(|json| std::fs::write(path, json))
            }
            None => match std::fs::remove_file(path) {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
                _ => Ok(()),
            },
        };
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "failed to persist credential");
        }
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::claims::token_expiry;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn token_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(b"{}");
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp).as_bytes());
        format!("{}.{}.sig", header, payload)
    }

    fn future_token() -> String {
        token_with_exp(Utc::now().timestamp() + 3600)
    }

    fn past_token() -> String {
        token_with_exp(Utc::now().timestamp() - 3600)
    }

    #[tokio::test]
    async fn test_set_derives_expiries() {
        let store = CredentialStore::new();
        assert!(store.get().await.is_none());

        let access = future_token();
        store.set(access.clone(), future_token()).await;

        let cred = store.get().await.unwrap();
        assert_eq!(cred.access_token, access);
        assert_eq!(cred.access_expiry, token_expiry(&access));
        assert!(cred.refresh_expiry.is_some());
    }

    #[tokio::test]
    async fn test_undecodable_token_is_expired() {
        let store = CredentialStore::new();
        store.set("garbage".to_string(), future_token()).await;

        let cred = store.get().await.unwrap();
        assert!(cred.access_expiry.is_none());
        assert!(store.is_access_expired(Duration::ZERO).await);
        assert!(!store.is_refresh_expired().await);
    }

    #[tokio::test]
    async fn test_access_expiry_with_skew() {
        let store = CredentialStore::new();
        // Expires in 10 seconds: fresh without skew, expired with 30s skew.
        store
            .set(token_with_exp(Utc::now().timestamp() + 10), future_token())
            .await;

        assert!(!store.is_access_expired(Duration::ZERO).await);
        assert!(store.is_access_expired(Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn test_refresh_expiry_no_skew() {
        let store = CredentialStore::new();
        store.set(future_token(), past_token()).await;
        assert!(store.is_refresh_expired().await);
    }

    #[tokio::test]
    async fn test_absent_credential_is_expired() {
        let store = CredentialStore::new();
        assert!(store.is_access_expired(Duration::ZERO).await);
        assert!(store.is_refresh_expired().await);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = CredentialStore::new();
        store.set(future_token(), future_token()).await;
        store.clear().await;
        assert!(store.get().await.is_none());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let store = CredentialStore::new();
        let cloned = store.clone();

        cloned.set(future_token(), future_token()).await;
        assert!(store.get().await.is_some());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let access = future_token();
        let refresh = future_token();
        {
            let store = CredentialStore::with_persistence(&path);
            store.set(access.clone(), refresh.clone()).await;
        }

        let reloaded = CredentialStore::with_persistence(&path);
        let cred = reloaded.get().await.unwrap();
        assert_eq!(cred.access_token, access);
        assert_eq!(cred.refresh_token, refresh);
        // Expiries are re-derived, not read from disk.
        assert_eq!(cred.access_expiry, token_expiry(&access));
    }

    #[tokio::test]
    async fn test_clear_removes_persisted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::with_persistence(&path);
        store.set(future_token(), future_token()).await;
        assert!(path.exists());

        store.clear().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_persisted_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = CredentialStore::with_persistence(&path);
        assert!(store.get().await.is_none());
    }
}
