//! Execution configuration for merge launches

use serde::Deserialize;
use std::path::Path;

use crate::{Error, Result};

/// Launch and stream settings.
///
/// Parsed from JSON; every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MergeConfig {
    /// Workers per block
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Threads backing a stream (0 = one per logical core)
    #[serde(default)]
    pub num_threads: usize,
}

fn default_block_size() -> usize {
    128
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            num_threads: 0,
        }
    }
}

impl MergeConfig {
    /// Load configuration from a JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or is invalid
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or the values are invalid
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `Error::InvalidConfig` if `block_size` is zero
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::InvalidConfig("block_size must be non-zero".into()));
        }
        Ok(())
    }
}
