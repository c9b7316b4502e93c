//! Persistent run configuration
//!
//! Stores the analysis settings together with the expected input format in
//! a JSON file. Missing fields fall back to their defaults.

use anyhow::Context;
use driftmeasure_core::DriftConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default capture rate, matching common measurement setups
pub const DEFAULT_SAMPLE_RATE: u32 = 96000;

/// Default number of captured channels
pub const DEFAULT_CHANNELS: u32 = 2;

/// Default frames per processed batch
pub const DEFAULT_BLOCK_FRAMES: usize = 1024;

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_channels() -> u32 {
    DEFAULT_CHANNELS
}

fn default_block_frames() -> usize {
    DEFAULT_BLOCK_FRAMES
}

/// Analysis settings plus input format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Sample rate of the input in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Number of interleaved input channels
    #[serde(default = "default_channels")]
    pub channels: u32,
    /// Frames handed to the engine per batch
    #[serde(default = "default_block_frames")]
    pub block_frames: usize,
    /// Drift analysis settings
    #[serde(flatten)]
    pub analysis: DriftConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            block_frames: default_block_frames(),
            analysis: DriftConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("could not parse config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded config from disk");
        Ok(config)
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }
}
