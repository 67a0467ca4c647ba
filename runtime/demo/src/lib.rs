//! Shared pieces of the `demo-server` and `demo-client` binaries.

pub mod config;
pub mod error;
pub mod methods;

pub use error::{DemoError, Result};

/// Log to stderr, filtered by `RUST_LOG` (default `info`)
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Config path given as the first command-line argument, if any
pub fn config_path() -> Option<String> {
    std::env::args().nth(1)
}
