// src/utils/config.rs
//! Runtime configuration
//!
//! Configuration is resolved in three layers: built-in defaults, an optional
//! `cohort.toml` file in the working directory, and `COHORT_*` environment
//! variables (highest precedence).

use crate::utils::errors::{CohortError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the cohort runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortConfig {
    /// Optional launcher program the agent binary is started under.
    /// Resolved through PATH when not an absolute path.
    pub launcher: Option<String>,

    /// Arguments passed to the launcher before the agent binary path
    pub launcher_args: Vec<String>,

    /// Directory for per-group symmetric world files
    pub world_dir: PathBuf,

    /// Symmetric heap bytes reserved per rank
    pub heap_size: usize,

    /// Default capacity of one symmetric slot, in bytes
    pub slot_capacity: usize,

    /// Host the requester listens on for two-way results
    pub reply_host: String,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            launcher: None,
            launcher_args: vec![],
            world_dir: std::env::temp_dir(),
            heap_size: 64 * 1024,  // 64KiB per rank
            slot_capacity: 4096,   // one encoded value
            reply_host: "127.0.0.1".to_string(),
        }
    }
}

impl CohortConfig {
    /// Load configuration from defaults, optional file, and environment
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&CohortConfig::default())?;

        let loaded = Config::builder()
            .add_source(defaults)
            .add_source(File::with_name("cohort").required(false))
            .add_source(
                Environment::with_prefix("COHORT")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("launcher_args"),
            )
            .build()?;

        let parsed: CohortConfig = loaded.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.heap_size < 4096 {
            return Err(CohortError::Config(
                "heap_size must be at least 4096 bytes".to_string(),
            ));
        }
        if self.slot_capacity < 64 {
            return Err(CohortError::Config(
                "slot_capacity must be at least 64 bytes".to_string(),
            ));
        }
        // Two-way execution reserves a result slot and a shared slot per call
        if self.slot_capacity * 2 > self.heap_size {
            return Err(CohortError::Config(format!(
                "heap_size {} cannot hold two slots of capacity {}",
                self.heap_size, self.slot_capacity
            )));
        }
        if self.reply_host.is_empty() {
            return Err(CohortError::Config("reply_host must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = CohortConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.slot_capacity, 4096);
        assert!(config.launcher.is_none());
    }

    #[test]
    fn test_validation_rejects_tiny_heap() {
        let config = CohortConfig {
            heap_size: 1024,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_oversized_slots() {
        let config = CohortConfig {
            heap_size: 8192,
            slot_capacity: 8192,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
