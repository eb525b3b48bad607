//! Authenticated API access layer for the admin portal.
//!
//! The crate's single public entry point for data calls is
//! [`ApiClient::send`]: it attaches the stored bearer credential, renews it
//! proactively (local expiry check, with skew) or reactively (server 401,
//! retried exactly once), guarantees at most one renewal call in flight
//! process-wide, and converts every failure shape the backend can produce
//! into one [`NormalizedError`] taxonomy.

pub mod client;
pub mod config;
pub mod errors;
pub mod security;
pub mod utils;

pub use client::{ApiClient, ApiRequest, ApiResponse};
pub use config::ClientConfig;
pub use errors::{ErrorCode, NormalizedError};
pub use security::credentials::{Credential, CredentialStore};
pub use security::refresh::RefreshCoordinator;

// Crate version exposed for runtime queries
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
