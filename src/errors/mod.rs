//! Normalization of heterogeneous backend failure shapes.
//!
//! Every failure surfaced by the access layer goes through here exactly
//! once. The parse priority is a contract, not incidental code order:
//!
//! 1. transport failure (no response) → [`NormalizedError::from_transport`]
//! 2. object with `message` + `code` → both used verbatim, `errors` map kept
//! 3. object with only legacy free text (`message`/`detail`/`error`) →
//!    code derived from the HTTP status
//! 4. bare string payload → the message, `UNKNOWN_ERROR`
//! 5. anything else → generic fallback, `UNKNOWN_ERROR`
//!
//! Parsing never fails; a malformed field degrades to the next shape down.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

const FALLBACK_MESSAGE: &str = "An unexpected error occurred";
const NETWORK_MESSAGE: &str = "Unable to reach the server, check your network connection";
const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired, please sign in again";
const GENERIC_USER_MESSAGE: &str = "Something went wrong, please try again";

/// Symbolic error taxonomy. Backend-declared domain codes that are not part
/// of the fixed set pass through verbatim as [`ErrorCode::Domain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    ValidationError,
    NetworkError,
    InternalError,
    UnknownError,
    Domain(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
            ErrorCode::Domain(code) => code,
        }
    }

    /// Map a backend symbolic code onto the taxonomy, passing unrecognized
    /// codes through verbatim.
    fn from_symbol(symbol: &str) -> Self {
        match symbol {
            "UNAUTHORIZED" => ErrorCode::Unauthorized,
            "FORBIDDEN" => ErrorCode::Forbidden,
            "NOT_FOUND" => ErrorCode::NotFound,
            "VALIDATION_ERROR" => ErrorCode::ValidationError,
            "NETWORK_ERROR" => ErrorCode::NetworkError,
            "INTERNAL_ERROR" => ErrorCode::InternalError,
            "UNKNOWN_ERROR" => ErrorCode::UnknownError,
            other => ErrorCode::Domain(other.to_string()),
        }
    }

    /// Fixed status table used when the payload carries no symbolic code.
    fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            400 => ErrorCode::ValidationError,
            s if s >= 500 => ErrorCode::InternalError,
            _ => ErrorCode::UnknownError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical, shape-independent representation of any failure surfaced
/// by the access layer. Constructed once per failed call; immutable after.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct NormalizedError {
    pub message: String,
    pub code: ErrorCode,
    /// HTTP status of the failed response, 0 when no response was received.
    pub http_status: u16,
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
    pub is_network_error: bool,
    /// Original payload, kept for diagnostics only.
    pub raw: Option<Value>,
}

impl NormalizedError {
    /// Normalize a response body (shapes 2-5 of the priority contract).
    pub fn from_payload(payload: Option<&Value>, http_status: u16) -> Self {
        match payload {
            Some(Value::Object(obj)) => {
                let message = obj.get("message").and_then(Value::as_str);
                let symbol = obj.get("code").and_then(Value::as_str);

                if let (Some(message), Some(symbol)) = (message, symbol) {
                    // Structured shape: message and code verbatim.
                    return Self {
                        message: message.to_string(),
                        code: ErrorCode::from_symbol(symbol),
                        http_status,
                        field_errors: obj.get("errors").and_then(normalize_field_errors),
                        is_network_error: false,
                        raw: payload.cloned(),
                    };
                }

                // Legacy shape: free text only, code from the status table.
                let text = message
                    .or_else(|| obj.get("detail").and_then(Value::as_str))
                    .or_else(|| obj.get("error").and_then(Value::as_str));
                let code = symbol
                    .map(ErrorCode::from_symbol)
                    .unwrap_or_else(|| ErrorCode::from_status(http_status));
                Self {
                    message: text.unwrap_or(FALLBACK_MESSAGE).to_string(),
                    code,
                    http_status,
                    field_errors: obj.get("errors").and_then(normalize_field_errors),
                    is_network_error: false,
                    raw: payload.cloned(),
                }
            }
            Some(Value::String(text)) if !text.is_empty() => Self {
                message: text.clone(),
                code: ErrorCode::UnknownError,
                http_status,
                field_errors: None,
                is_network_error: false,
                raw: payload.cloned(),
            },
            other => Self {
                message: FALLBACK_MESSAGE.to_string(),
                code: ErrorCode::UnknownError,
                http_status,
                field_errors: None,
                is_network_error: false,
                raw: other.cloned(),
            },
        }
    }

    /// Normalize a transport-level failure (shape 1): the call never reached
    /// the server or was aborted. The payload, if any, is irrelevant.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        Self {
            message: NETWORK_MESSAGE.to_string(),
            code: ErrorCode::NetworkError,
            http_status: 0,
            field_errors: None,
            is_network_error: true,
            raw: Some(Value::String(err.to_string())),
        }
    }

    /// Terminal error raised when credential renewal fails or the refresh
    /// token itself has expired.
    pub fn session_expired() -> Self {
        Self {
            message: SESSION_EXPIRED_MESSAGE.to_string(),
            code: ErrorCode::Unauthorized,
            http_status: 401,
            field_errors: None,
            is_network_error: false,
            raw: None,
        }
    }

    /// User-facing message for this error. See [`user_facing_message`].
    pub fn user_message(&self) -> String {
        user_facing_message(&self.code, &self.message)
    }
}

/// Map a symbolic code to a user-facing string.
///
/// Known codes get a fixed localized string. Unrecognized codes fall back to
/// the raw message, unless the message looks like an internal/technical
/// string, in which case a generic fallback is preferred over leaking it.
pub fn user_facing_message(code: &ErrorCode, raw_message: &str) -> String {
    let text = match code {
        ErrorCode::Unauthorized => SESSION_EXPIRED_MESSAGE,
        ErrorCode::Forbidden => "You do not have permission to perform this action",
        ErrorCode::NotFound => "The requested resource was not found",
        ErrorCode::ValidationError => "Some fields contain invalid values, please review and try again",
        ErrorCode::NetworkError => NETWORK_MESSAGE,
        ErrorCode::InternalError => "The server encountered an error, please try again later",
        ErrorCode::UnknownError | ErrorCode::Domain(_) => {
            if raw_message.is_empty() || looks_technical(raw_message) {
                GENERIC_USER_MESSAGE
            } else {
                raw_message
            }
        }
    };
    text.to_string()
}

/// Heuristic for messages that were never meant for end users: stack
/// frames, interpreter artifacts, panic text.
fn looks_technical(message: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\bundefined\b|\bnull\b|\bNaN\b|panicked at|stack backtrace|Traceback|\b\w+Error:|\bat .+:\d+(:\d+)?",
        )
        .expect("technical-message pattern")
    });
    re.is_match(message)
}

fn normalize_field_errors(value: &Value) -> Option<BTreeMap<String, Vec<String>>> {
    let obj = value.as_object()?;
    let mut out = BTreeMap::new();
    for (field, entry) in obj {
        let messages: Vec<String> = match entry {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items.iter().map(stringify).collect(),
            other => vec![stringify(other)],
        };
        if !messages.is_empty() {
            out.insert(field.clone(), messages);
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
