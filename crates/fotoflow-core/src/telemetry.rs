//! Tracing initialization for binaries and long-running jobs.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call once per process; later calls fail.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "fotoflow=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}
