//! The request gateway: the single entry point for every feature-level
//! data call made by the portal UI.

pub mod request;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::errors::NormalizedError;
use crate::security::credentials::CredentialStore;
use crate::security::refresh::{RefreshCoordinator, TokenPair};

pub use request::{ApiRequest, ApiResponse};

/// Authenticated API client for the portal backend.
///
/// Injects the bearer credential, renews it proactively (local expiry
/// check) or reactively (server 401), retries the original request at most
/// once after a successful renewal, and normalizes every failure before
/// surfacing it. Cloning is cheap; clones share the credential store and
/// the renewal coordinator.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    http: Client,
    store: CredentialStore,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("creating HTTP client")?;

        let store = match &config.persist_path {
            Some(path) => CredentialStore::with_persistence(path),
            None => CredentialStore::new(),
        };

        let refresher = RefreshCoordinator::new(
            store.clone(),
            http.clone(),
            format!("{}{}", config.base_url, config.refresh_path),
            Duration::from_secs(config.expiry_skew_secs),
        );

        debug!(base_url = %config.base_url, "API client initialized");

        Ok(Self {
            config: Arc::new(config),
            http,
            store,
            refresher,
        })
    }

    /// The credential store, exposed for the sign-out action and for guard
    /// code that needs to know whether a session exists.
    pub fn credentials(&self) -> &CredentialStore {
        &self.store
    }

    /// Exchange an identity proof (e.g. username/password form data) for an
    /// initial credential pair at the issue endpoint.
    pub async fn sign_in(&self, proof: &Value) -> Result<(), NormalizedError> {
        let url = format!("{}{}", self.config.base_url, self.config.issue_path);
        let response = self
            .http
            .post(&url)
            .header("X-Request-Id", Uuid::new_v4().to_string())
            .json(proof)
            .send()
            .await
            .map_err(|err| NormalizedError::from_transport(&err))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = read_json_body(response).await;
            return Err(NormalizedError::from_payload(body.as_ref(), status));
        }

        match response.json::<TokenPair>().await {
            Ok(pair) => {
                let refresh = pair.refresh.unwrap_or_default();
                self.store.set(pair.access, refresh).await;
                debug!("signed in, credential stored");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "malformed sign-in response");
                Err(NormalizedError::from_payload(None, status))
            }
        }
    }

    /// Explicit sign-out: drop the credential.
    pub async fn sign_out(&self) {
        self.store.clear().await;
        debug!("signed out");
    }

    /// Send a request, handling credential injection, renewal, and the
    /// single bounded retry.
    ///
    /// The caller either gets a successful [`ApiResponse`] or exactly one
    /// [`NormalizedError`]; no raw transport error ever escapes.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, NormalizedError> {
        let mut refreshed = false;

        // Proactive path: renew before dispatch when the stored access
        // token is within the skew window of its expiry.
        if request.requires_auth && self.store.get().await.is_some() {
            let skew = Duration::from_secs(self.config.expiry_skew_secs);
            if self.store.is_access_expired(skew).await {
                debug!(path = %request.path, "access token expiring, renewing before dispatch");
                if !self.refresher.ensure_fresh().await {
                    return Err(NormalizedError::session_expired());
                }
                refreshed = true;
            }
        }

        // Bounded retry: the second iteration is only reachable through the
        // reactive 401 path below, and only when no renewal preceded it.
        for attempt in 0..2 {
            let attached = if request.requires_auth {
                self.store.get().await.map(|cred| cred.access_token)
            } else {
                None
            };
            let response = match self.dispatch(&request, attached.as_deref()).await {
                Ok(response) => response,
                Err(err) => return Err(NormalizedError::from_transport(&err)),
            };

            let status = response.status().as_u16();
            if status == 401 && request.requires_auth && !refreshed && attempt == 0 {
                // Reactive path: clock skew or a credential invalidated
                // server-side between the proactive check and the dispatch.
                debug!(path = %request.path, "request rejected with 401, renewing credential");
                refreshed = true;
                let renewed = match attached.as_deref() {
                    Some(rejected) => self.refresher.invalidate_and_refresh(rejected).await,
                    None => self.refresher.ensure_fresh().await,
                };
                if renewed {
                    continue;
                }
                return Err(NormalizedError::session_expired());
            }

            if response.status().is_success() {
                return Ok(ApiResponse {
                    status,
                    body: read_json_body(response).await,
                });
            }

            let body = read_json_body(response).await;
            let err = NormalizedError::from_payload(body.as_ref(), status);
            debug!(path = %request.path, status = %status, code = %err.code, "request failed");
            return Err(err);
        }

        unreachable!("retry loop always returns within two attempts")
    }

    /// GET convenience wrapper.
    pub async fn get(&self, path: &str) -> Result<ApiResponse, NormalizedError> {
        self.send(ApiRequest::get(path)).await
    }

    /// POST convenience wrapper.
    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, NormalizedError> {
        self.send(ApiRequest::post(path, body)).await
    }

    /// PUT convenience wrapper.
    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse, NormalizedError> {
        self.send(ApiRequest::put(path, body)).await
    }

    /// DELETE convenience wrapper.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse, NormalizedError> {
        self.send(ApiRequest::delete(path)).await
    }

    /// Build and dispatch one attempt. The caller reads the access token
    /// immediately before this and passes it in, so there is no suspension
    /// between reading the store and attaching the credential; a token
    /// swapped in by a concurrent renewal cannot be half-observed.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}{}", self.config.base_url, request.path);

        let mut headers = HeaderMap::new();
        let request_id = Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert("X-Request-Id", value);
        }

        if let Some(token) = access_token {
            let bearer = format!("Bearer {}", token);
            if let Ok(value) = HeaderValue::from_str(&bearer) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        debug!(
            method = %request.method,
            url = %url,
            request_id = %request_id,
            authenticated = %request.requires_auth,
            "dispatching request"
        );

        let mut builder = self.http.request(request.method.clone(), &url).headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder.send().await
    }
}

/// Read a response body leniently: empty bodies become `None`, JSON parses
/// as-is, and anything else is carried as a plain string so the error
/// normalizer can treat it as the bare-string shape.
async fn read_json_body(response: reqwest::Response) -> Option<Value> {
    let text = response.text().await.unwrap_or_default();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(text)),
    }
}
