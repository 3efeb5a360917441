// src/observability/mod.rs
//! Tracing and logging setup
//!
//! Call [`init_tracing`] once near the top of `main`, before the bootstrap
//! dispatch runs, so spawned agents log through the same pipeline as the
//! requesting process. The filter is taken from `RUST_LOG` when set.

use crate::utils::errors::{CohortError, Result};
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| CohortError::Runtime(format!("tracing init failed: {}", e)))
}
