//! Tracing subscriber setup for binaries and tests embedding the SDK.

/// Default filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn";

/// Installs a formatted tracing subscriber filtered by `RUST_LOG`.
///
/// Returns false when a global subscriber was already installed by the embedding host.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)),
        )
        .try_init()
        .is_ok()
}
