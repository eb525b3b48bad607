use reqwest::Method;
use serde_json::Value;

/// A feature-level API call, before credential injection.
///
/// Requests are authenticated by default; `public()` opts out for the
/// handful of endpoints (sign-in, health) that take no credential.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `/api/v1/orgs`.
    pub path: String,
    pub body: Option<Value>,
    pub requires_auth: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            requires_auth: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Mark the request as unauthenticated: no credential is attached and
    /// no renewal is triggered on its behalf.
    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }
}

/// A successful API result. An empty response body (e.g. a 204
/// acknowledgement) is an explicit `None`, never a decode attempt.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    /// Deserialize the body into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let body = self.body.clone().unwrap_or(Value::Null);
        serde_json::from_value(body)
    }
}
