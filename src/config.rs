// Configuration management for the capture element

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::{ModeId, TimecodeFormat};

/// Capture element configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    /// Name used in log output
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Expected input mode (drives buffer durations and the simulated device)
    #[serde(default)]
    pub mode: ModeId,

    /// Timecode to query from frames for log output.
    /// Diagnostic only, `disabled` by default.
    #[serde(default)]
    pub timecode_format: TimecodeFormat,

    /// Warn once per batch of dropped frames
    #[serde(default = "default_true")]
    pub warn_on_drops: bool,

    /// How long the streaming thread waits for a frame (0 = forever)
    #[serde(default)]
    pub wait_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            mode: ModeId::default(),
            timecode_format: TimecodeFormat::Disabled,
            warn_on_drops: true,
            wait_timeout_ms: 0,
        }
    }
}

impl CaptureConfig {
    /// Load config from disk
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load config from disk or return default
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save config to disk
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("decklink-capture")
        .join("config.toml")
}

/// Default device name (for serde)
fn default_device_name() -> String {
    "decklink0".to_string()
}

/// Default true value (for serde)
fn default_true() -> bool {
    true
}
