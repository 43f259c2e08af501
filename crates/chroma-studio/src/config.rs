use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How the native engine is handed its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineInputMode {
    #[default]
    Stdin,
    ScratchFile,
}

/// Timing and engine knobs of the studio layer.
#[derive(Debug, Clone, Deserialize)]
pub struct StudioConfig {
    #[serde(default = "StudioConfig::default_autobuild_delay_ms")]
    pub autobuild_delay_ms: u64,
    #[serde(default = "StudioConfig::default_autobuild_enabled")]
    pub autobuild_enabled: bool,
    #[serde(default = "StudioConfig::default_refresh_ok_ms")]
    pub refresh_ok_ms: u64,
    #[serde(default = "StudioConfig::default_refresh_err_ms")]
    pub refresh_err_ms: u64,
    #[serde(default = "StudioConfig::default_engine_timeout_ms")]
    pub engine_timeout_ms: u64,
    #[serde(default)]
    pub engine_input: EngineInputMode,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            autobuild_delay_ms: Self::default_autobuild_delay_ms(),
            autobuild_enabled: Self::default_autobuild_enabled(),
            refresh_ok_ms: Self::default_refresh_ok_ms(),
            refresh_err_ms: Self::default_refresh_err_ms(),
            engine_timeout_ms: Self::default_engine_timeout_ms(),
            engine_input: EngineInputMode::default(),
        }
    }
}

impl StudioConfig {
    const fn default_autobuild_delay_ms() -> u64 {
        400
    }

    const fn default_autobuild_enabled() -> bool {
        true
    }

    const fn default_refresh_ok_ms() -> u64 {
        900
    }

    const fn default_refresh_err_ms() -> u64 {
        2500
    }

    const fn default_engine_timeout_ms() -> u64 {
        10_000
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn autobuild_delay(&self) -> Duration {
        Duration::from_millis(self.autobuild_delay_ms)
    }

    pub fn refresh_ok(&self) -> Duration {
        Duration::from_millis(self.refresh_ok_ms)
    }

    pub fn refresh_err(&self) -> Duration {
        Duration::from_millis(self.refresh_err_ms)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }
}
