//! TOML-based application configuration.
//!
//! Stores sync cadence, outbox tuning, snapshot export settings, and the
//! provider endpoint/token. Configuration lives at
//! `~/.config/organizer/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::storage::data_dir;

/// Sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote calendar/list the engine reconciles against.
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// Poll interval while local activity is recent.
    #[serde(default = "default_active_poll_secs")]
    pub active_poll_secs: u64,
    /// Poll interval when idle; also caps push retry backoff.
    #[serde(default = "default_idle_poll_secs")]
    pub idle_poll_secs: u64,
    /// Outbox entries drained per pass.
    #[serde(default = "default_outbox_batch_size")]
    pub outbox_batch_size: usize,
    /// First retry delay for a failing push.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: i64,
}

/// Snapshot export mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// One stable file, overwritten each export.
    Latest,
    /// A new timestamped file per export.
    Timestamped,
}

impl Default for ExportMode {
    fn default() -> Self {
        ExportMode::Latest
    }
}

/// Periodic snapshot export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Export directory; defaults to `<data_dir>/exports`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub mode: ExportMode,
    /// Export once every N scheduler ticks.
    #[serde(default = "default_export_every_ticks")]
    pub every_ticks: u64,
}

/// Remote provider endpoint configuration. The token is injected, never
/// refreshed here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Override for tests/self-hosted gateways.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/organizer/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

// Default functions
fn default_calendar_id() -> String {
    "primary".into()
}
fn default_active_poll_secs() -> u64 {
    60
}
fn default_idle_poll_secs() -> u64 {
    900
}
fn default_outbox_batch_size() -> usize {
    20
}
fn default_backoff_base_secs() -> i64 {
    30
}
fn default_export_every_ticks() -> u64 {
    4
}
fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            calendar_id: default_calendar_id(),
            active_poll_secs: default_active_poll_secs(),
            idle_poll_secs: default_idle_poll_secs(),
            outbox_batch_size: default_outbox_batch_size(),
            backoff_base_secs: default_backoff_base_secs(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            mode: ExportMode::default(),
            every_ticks: default_export_every_ticks(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, std::io::Error> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the default config on first use.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path().map_err(|err| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: err.to_string(),
        })?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|err| ConfigError::LoadFailed {
                path,
                message: err.to_string(),
            }),
            Err(_) => {
                let config = Self::default();
                config.save()?;
                Ok(config)
            }
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path().map_err(|err| ConfigError::SaveFailed {
            path: PathBuf::from("config.toml"),
            message: err.to_string(),
        })?;
        let content = toml::to_string_pretty(self).map_err(|err| ConfigError::SaveFailed {
            path: path.clone(),
            message: err.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|err| ConfigError::SaveFailed {
            path,
            message: err.to_string(),
        })
    }

    /// Load from disk, returning defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Directory snapshots are exported to.
    pub fn export_dir(&self) -> Result<PathBuf, std::io::Error> {
        match &self.export.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(data_dir()?.join("exports")),
        }
    }

    /// Provider token: config value, overridable via `ORGANIZER_API_TOKEN`.
    pub fn provider_token(&self) -> Option<String> {
        std::env::var("ORGANIZER_API_TOKEN")
            .ok()
            .filter(|token| !token.is_empty())
            .or_else(|| self.provider.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sync.calendar_id, "primary");
        assert_eq!(parsed.sync.idle_poll_secs, 900);
        assert_eq!(parsed.export.mode, ExportMode::Latest);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: Config = toml::from_str(
            "[sync]\ncalendar_id = \"work\"\n\n[export]\nmode = \"timestamped\"\n",
        )
        .unwrap();
        assert_eq!(parsed.sync.calendar_id, "work");
        assert_eq!(parsed.sync.active_poll_secs, 60);
        assert_eq!(parsed.export.mode, ExportMode::Timestamped);
        assert!(parsed.export.enabled);
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.sync.outbox_batch_size, 20);
        assert_eq!(parsed.sync.backoff_base_secs, 30);
        assert_eq!(parsed.export.every_ticks, 4);
        assert!(parsed.provider.access_token.is_none());
    }
}
