//! Configuration types and structures.
//!
//! Secrets (API keys, store key, service-account key path) have no defaults
//! and must come from a config file or the environment.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default port for the board server.
pub const DEFAULT_UI_PORT: u16 = 31995;

/// Spreadsheet the board reads from and writes descriptions to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    #[serde(default = "default_sheets_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub spreadsheet_id: String,

    /// Tab holding the live task list.
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// Tab that receives per-project description edits.
    #[serde(default = "default_staging_sheet_name")]
    pub staging_sheet_name: String,

    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            base_url: default_sheets_base_url(),
            spreadsheet_id: String::new(),
            sheet_name: default_sheet_name(),
            staging_sheet_name: default_staging_sheet_name(),
            api_key: None,
        }
    }
}

fn default_sheets_base_url() -> String {
    "https://sheets.googleapis.com".to_string()
}

fn default_sheet_name() -> String {
    "Primary Live List".to_string()
}

fn default_staging_sheet_name() -> String {
    "Staging - Project Details".to_string()
}

/// Hosted relational store for manual tasks and the refresh channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub key: Option<String>,

    #[serde(default = "default_table")]
    pub table: String,

    /// Broadcast channel used for cross-client refresh signals.
    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default = "default_event")]
    pub event: String,

    /// Timeout for insert/update/delete requests (default: 10).
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            table: default_table(),
            channel: default_channel(),
            event: default_event(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

fn default_table() -> String {
    "weekly_tasks".to_string()
}

fn default_channel() -> String {
    "refresh_signals".to_string()
}

fn default_event() -> String {
    "data_updated".to_string()
}

fn default_write_timeout_secs() -> u64 {
    10
}

/// Service account used for staging-sheet writes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceAccountConfig {
    /// Path to the JSON key file. Without it, description edits cannot sync.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

/// Background refresh behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Poll interval in seconds (default: 1800 = 30 minutes).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// `source` field stamped on outgoing refresh signals.
    #[serde(default = "default_signal_source")]
    pub source: String,

    /// Capacity of the in-process signal channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            source: default_signal_source(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    1800
}

fn default_signal_source() -> String {
    "web_app".to_string()
}

fn default_channel_capacity() -> usize {
    64
}

/// Board mutation behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Undo optimistic edits when the remote write fails (default: true).
    #[serde(default = "default_true")]
    pub rollback_on_failure: bool,

    /// Number of recent mutations kept for the status view.
    #[serde(default = "default_mutation_history")]
    pub mutation_history: usize,

    /// Weeks either side of today a task date may fall in (default: 104).
    /// Dates beyond it are shown in the current week.
    #[serde(default = "default_max_week_span")]
    pub max_week_span: u32,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            rollback_on_failure: true,
            mutation_history: default_mutation_history(),
            max_week_span: default_max_week_span(),
        }
    }
}

fn default_max_week_span() -> u32 {
    crate::grid::DEFAULT_MAX_WEEK_SPAN
}

fn default_true() -> bool {
    true
}

fn default_mutation_history() -> usize {
    100
}

/// Board server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_ui_port")]
    pub port: u16,

    /// Where UI preferences are persisted.
    #[serde(default = "default_preferences_path")]
    pub preferences_path: PathBuf,

    /// Initial retry delay in milliseconds when the server fails to start (default: 15000).
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    /// Jitter range in milliseconds for retry delay (default: 5000, meaning ±5s).
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    /// Maximum retry interval in milliseconds (default: 240000 = 4 minutes).
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// Exponential backoff multiplier (default: 2.0).
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            port: default_ui_port(),
            preferences_path: default_preferences_path(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            retry_max_ms: default_retry_max_ms(),
            retry_multiplier: default_retry_multiplier(),
        }
    }
}

fn default_ui_port() -> u16 {
    DEFAULT_UI_PORT
}

fn default_preferences_path() -> PathBuf {
    PathBuf::from("shop-schedule/preferences.json")
}

fn default_retry_initial_ms() -> u64 {
    15_000
}

fn default_retry_jitter_ms() -> u64 {
    5_000
}

fn default_retry_max_ms() -> u64 {
    240_000
}

fn default_retry_multiplier() -> f64 {
    2.0
}

/// Editing lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditingConfig {
    /// Password that unlocks editing. When unset, editing stays locked.
    #[serde(default)]
    pub password: Option<String>,
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sheets: SheetsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub service_account: ServiceAccountConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub board: BoardConfig,

    #[serde(default)]
    pub ui: UiConfig,

    #[serde(default)]
    pub editing: EditingConfig,
}

impl Config {
    /// Load configuration from a single YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Check that the settings needed to read tasks are present.
    pub fn validate_sources(&self) -> Result<()> {
        if self.sheets.spreadsheet_id.trim().is_empty() {
            return Err(anyhow!("sheets.spreadsheet_id is not configured"));
        }
        if self.sheets.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            return Err(anyhow!(
                "sheets.api_key is not configured (set SHOP_SCHEDULE_SHEETS_API_KEY)"
            ));
        }
        if self.store.url.is_none() || self.store.key.is_none() {
            return Err(anyhow!(
                "store.url and store.key must be configured (set SHOP_SCHEDULE_STORE_URL / SHOP_SCHEDULE_STORE_KEY)"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.refresh.poll_interval_secs, 1800);
        assert_eq!(config.store.table, "weekly_tasks");
        assert_eq!(config.store.event, "data_updated");
        assert_eq!(config.store.write_timeout_secs, 10);
        assert!(config.board.rollback_on_failure);
        assert!(config.editing.password.is_none());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
sheets:
  spreadsheet_id: abc
board:
  rollback_on_failure: false
"#,
        )
        .unwrap();
        assert_eq!(config.sheets.spreadsheet_id, "abc");
        assert_eq!(config.sheets.staging_sheet_name, "Staging - Project Details");
        assert!(!config.board.rollback_on_failure);
        assert_eq!(config.board.mutation_history, 100);
    }

    #[test]
    fn test_validate_sources_requires_secrets() {
        let mut config = Config::default();
        assert!(config.validate_sources().is_err());

        config.sheets.spreadsheet_id = "abc".into();
        config.sheets.api_key = Some("key".into());
        assert!(config.validate_sources().is_err());

        config.store.url = Some("https://store.example".into());
        config.store.key = Some("anon".into());
        assert!(config.validate_sources().is_ok());
    }
}
