pub mod claims;
pub mod credentials;
pub mod refresh;
