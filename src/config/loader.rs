//! Configuration loader with tier-based merging.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CONFIG_FILE: &str = "config.yaml";

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    Defaults = 0,
    Project = 1,
    User = 2,
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover tier directories from the environment and defaults.
    pub fn discover() -> Self {
        let user_dir = std::env::var("SHOP_SCHEDULE_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".shop-schedule")));

        let project_dir = std::env::var("SHOP_SCHEDULE_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("shop-schedule")));

        Self {
            project_dir,
            user_dir,
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Read one tier's YAML file, if present. A file that exists but does not
/// parse is skipped with a warning.
fn read_tier(dir: Option<&Path>, tier: ConfigTier) -> Option<(Value, PathBuf)> {
    let file = dir?.join(CONFIG_FILE);
    if !file.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(&file) {
        Ok(content) => content,
        Err(e) => {
            warn!(tier = %tier, path = %file.display(), error = %e, "Failed to read config");
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => {
            debug!(tier = %tier, path = %file.display(), "Loaded config tier");
            Some((value, file))
        }
        Err(e) => {
            warn!(tier = %tier, path = %file.display(), error = %e, "Ignoring invalid config");
            None
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Highest-priority file that contributed, if any.
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration from all tiers with proper merging.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load configuration with explicit paths.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        if let Ok(explicit) = std::env::var("SHOP_SCHEDULE_CONFIG_PATH") {
            let path = PathBuf::from(explicit);
            let mut config = Config::load(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            Self::apply_env_overrides(&mut config)?;
            return Ok(Self {
                paths,
                config,
                config_path: Some(path),
            });
        }

        let mut tiers: Vec<Value> = vec![serde_json::to_value(Config::default())?];
        let mut config_path = None;

        for (dir, tier) in [
            (paths.project_dir.as_deref(), ConfigTier::Project),
            (paths.user_dir.as_deref(), ConfigTier::User),
        ] {
            if let Some((value, file)) = read_tier(dir, tier) {
                tiers.push(value);
                config_path = Some(file);
            }
        }

        let merged = deep_merge_all(tiers);
        let mut config: Config = serde_json::from_value(merged)?;
        Self::apply_env_overrides(&mut config)?;

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    /// Apply environment variable overrides to config.
    fn apply_env_overrides(config: &mut Config) -> Result<()> {
        if let Ok(key) = std::env::var("SHOP_SCHEDULE_SHEETS_API_KEY") {
            config.sheets.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("SHOP_SCHEDULE_STORE_URL") {
            config.store.url = Some(url);
        }
        if let Ok(key) = std::env::var("SHOP_SCHEDULE_STORE_KEY") {
            config.store.key = Some(key);
        }
        if let Ok(path) = std::env::var("SHOP_SCHEDULE_SERVICE_ACCOUNT") {
            config.service_account.key_path = Some(PathBuf::from(path));
        }
        if let Ok(port) = std::env::var("SHOP_SCHEDULE_PORT") {
            config.ui.port = port
                .parse()
                .with_context(|| format!("SHOP_SCHEDULE_PORT is not a port: {}", port))?;
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
