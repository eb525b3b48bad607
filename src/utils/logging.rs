use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing output for binaries and demos embedding the client.
/// Library code only emits events; consumers that already install their own
/// subscriber should not call this.
pub fn init() {
    let fmt_layer = fmt::layer().with_target(false).compact();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
