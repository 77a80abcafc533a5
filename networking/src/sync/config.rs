/// Initial sync configuration.
///
/// Compile-time limits and the runtime [`SyncSettings`] an owner may load
/// from YAML.
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Maximum number of slots covered by one range request.
pub const MAX_BLOCKS_PER_REQUEST: u64 = 64;

/// Default capacity of the single block channel.
pub const DEFAULT_BLOCK_BUFFER_SIZE: usize = 100;

/// Default capacity of the batched block channel.
pub const DEFAULT_BATCHED_BLOCK_BUFFER_SIZE: usize = 100;

/// Default capacity of the block announcement channel.
pub const DEFAULT_BLOCK_ANNOUNCE_BUFFER_SIZE: usize = 100;

/// Default capacity of the state channel.
pub const DEFAULT_STATE_BUFFER_SIZE: usize = 100;

/// Interval between sync ticks (in seconds).
pub const SYNC_TICK_INTERVAL_SECS: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SyncSettings {
    pub block_buffer_size: usize,
    pub batched_block_buffer_size: usize,
    pub block_announce_buffer_size: usize,
    pub state_buffer_size: usize,
    /// Wait for a confirmed sync target before persisting any block.
    pub request_state: bool,
    pub sync_interval_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            block_buffer_size: DEFAULT_BLOCK_BUFFER_SIZE,
            batched_block_buffer_size: DEFAULT_BATCHED_BLOCK_BUFFER_SIZE,
            block_announce_buffer_size: DEFAULT_BLOCK_ANNOUNCE_BUFFER_SIZE,
            state_buffer_size: DEFAULT_STATE_BUFFER_SIZE,
            request_state: false,
            sync_interval_ms: SYNC_TICK_INTERVAL_SECS * 1000,
        }
    }
}

impl SyncSettings {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read sync settings from {}", path.display()))?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: SyncSettings =
            serde_yaml::from_str(yaml).context("failed to parse sync settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Tokio channels panic on zero capacity, so reject it up front.
    pub fn validate(&self) -> Result<()> {
        let buffers = [
            ("block_buffer_size", self.block_buffer_size),
            ("batched_block_buffer_size", self.batched_block_buffer_size),
            ("block_announce_buffer_size", self.block_announce_buffer_size),
            ("state_buffer_size", self.state_buffer_size),
        ];
        for (name, size) in buffers {
            anyhow::ensure!(size > 0, "{name} must be greater than zero");
        }
        anyhow::ensure!(
            self.sync_interval_ms > 0,
            "sync_interval_ms must be greater than zero"
        );
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}
