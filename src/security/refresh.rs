use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::security::credentials::CredentialStore;

/// The in-flight renewal attempt, shared by every caller that observes an
/// expired credential while it runs.
type RefreshOutcome = Shared<BoxFuture<'static, bool>>;

/// Token pair returned by the credential-issue and credential-refresh
/// endpoints. Refresh-token rotation is optional.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenPair {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Coordinates credential renewal so that at most one renewal call is in
/// flight process-wide.
///
/// Concurrent callers that discover expiry while a renewal runs await the
/// same shared outcome rather than polling the store, so every one of them
/// resumes against the post-refresh credential (or the terminal failure).
/// The renewal itself runs on a detached task: a caller cancelled mid-wait
/// does not abort it for the others.
#[derive(Clone)]
pub struct RefreshCoordinator {
    store: CredentialStore,
    http: Client,
    refresh_url: String,
    skew: Duration,
    in_flight: Arc<Mutex<Option<RefreshOutcome>>>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refresh_url", &self.refresh_url)
            .field("skew", &self.skew)
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(store: CredentialStore, http: Client, refresh_url: String, skew: Duration) -> Self {
        Self {
            store,
            http,
            refresh_url,
            skew,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Ensure the store holds a usable access token, renewing it if needed.
    ///
    /// Returns `false` when the session is unrecoverable: no credential, an
    /// expired refresh token (no network call is attempted in either case),
    /// or a renewal that the backend rejected. A failed renewal clears the
    /// store; the caller is responsible for terminating the session. Renewal
    /// failures are never retried here.
    pub async fn ensure_fresh(&self) -> bool {
        self.refresh_with(None).await
    }

    /// Renew after the backend refused `rejected_access` with a 401.
    ///
    /// Unlike [`ensure_fresh`](Self::ensure_fresh), a locally-fresh access
    /// token does not short-circuit here unless it already differs from the
    /// rejected one: the server's verdict on the token it saw outranks the
    /// local expiry estimate (clock skew, server-side invalidation).
    pub async fn invalidate_and_refresh(&self, rejected_access: &str) -> bool {
        self.refresh_with(Some(rejected_access)).await
    }

    async fn refresh_with(&self, rejected_access: Option<&str>) -> bool {
        if let Some(pending) = self.current_attempt() {
            debug!("renewal already in flight, awaiting shared outcome");
            return pending.await;
        }

        let Some(cred) = self.store.get().await else {
            debug!("no credential to renew");
            self.store.clear().await;
            return false;
        };
        let superseded = rejected_access.is_none_or(|rejected| cred.access_token != rejected);
        if superseded && !self.store.is_access_expired(self.skew).await {
            // A renewal settled between the caller's expiry check (or its
            // rejected dispatch) and now; the stored token is already fresh.
            return true;
        }
        if self.store.is_refresh_expired().await {
            warn!("refresh token expired, session is unrecoverable");
            self.store.clear().await;
            return false;
        }

        let outcome = {
            let mut slot = match self.in_flight.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(pending) = slot.as_ref() {
                // Lost the race to another caller that installed first.
                pending.clone()
            } else {
                let attempt = self.spawn_attempt(cred.refresh_token);
                *slot = Some(attempt.clone());
                attempt
            }
        };

        outcome.await
    }

    fn current_attempt(&self) -> Option<RefreshOutcome> {
        match self.in_flight.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Spawn the renewal on a detached task and wrap its handle in a shared
    /// future. The task empties the slot before it resolves, so the next
    /// expiry starts a fresh attempt instead of replaying a settled result.
    fn spawn_attempt(&self, refresh_token: String) -> RefreshOutcome {
        let store = self.store.clone();
        let http = self.http.clone();
        let url = self.refresh_url.clone();
        let in_flight = Arc::clone(&self.in_flight);

        let handle = tokio::spawn(async move {
            let renewed = perform_renewal(&store, &http, &url, refresh_token).await;
            match in_flight.lock() {
                Ok(mut slot) => {
                    slot.take();
                }
                Err(poisoned) => {
                    poisoned.into_inner().take();
                }
            }
            renewed
        });

        async move { handle.await.unwrap_or(false) }.boxed().shared()
    }
}

/// Issue the renewal call and update the store with the result. On any
/// failure the store is cleared: no partial or stale credential is left
/// behind for the next request to trip over.
async fn perform_renewal(
    store: &CredentialStore,
    http: &Client,
    url: &str,
    refresh_token: String,
) -> bool {
    let body = serde_json::json!({ "refresh": refresh_token });
    let response = match http.post(url).json(&body).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "credential renewal request failed");
            store.clear().await;
            return false;
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!(status = %status, "credential renewal rejected by backend");
        store.clear().await;
        return false;
    }

    match response.json::<TokenPair>().await {
        Ok(pair) => {
            // Rotation is optional: keep the prior refresh token unless the
            // backend supplied a new one.
            let next_refresh = pair.refresh.unwrap_or(refresh_token);
            store.set(pair.access, next_refresh).await;
            info!("credential renewed");
            true
        }
        Err(err) => {
            warn!(error = %err, "malformed renewal response");
            store.clear().await;
            false
        }
    }
}
