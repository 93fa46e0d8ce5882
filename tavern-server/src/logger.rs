use tracing_subscriber::{EnvFilter, fmt};

/// Initializes tracing using the `RUST_LOG` environment variable.
///
/// Defaults to `info` when `RUST_LOG` is unset or unparsable. Intended
/// for the binary; tests should prefer [`try_init`] to avoid panicking
/// when a subscriber is already set.
pub fn init() {
    try_init().expect("failed to initialize tracing")
}

/// Attempts to initialize tracing and returns an error if a subscriber
/// is already set.
pub fn try_init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).try_init().map_err(Into::into)
}
