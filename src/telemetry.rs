//! Tracing setup
//!
//! The library only emits `tracing` events; installing a subscriber is up
//! to the host. The load-test binary and `dbx_client_new` (when the config
//! carries a log filter) install one here.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "eventdbx_native=info";

/// Install a global subscriber.
///
/// `filter` takes precedence over `RUST_LOG`. Returns `false` when a
/// subscriber was already installed, which is not an error: the first one
/// wins.
pub fn init_tracing(filter: Option<&str>, json: bool) -> bool {
    let env_filter = match filter {
        Some(directives) => EnvFilter::try_new(directives).map_err(|e| e.to_string()),
        None => EnvFilter::try_from_default_env().map_err(|e| e.to_string()),
    }
    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    installed.is_ok()
}
