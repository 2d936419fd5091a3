//! Configuration system for Watchfire.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. Configuration is loaded from `~/.config/watchfire/config.toml`
//! and/or `.watchfire/config.toml` in the working directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the Watchfire engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub budget: BudgetConfig,
    pub clustering: ClusteringConfig,
    pub enrichment: EnrichmentConfig,
    pub store: StoreConfig,
}

/// Per-organization query budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Units granted at each reset.
    pub default_quota: u32,
    /// Length of the rolling reset window in hours.
    pub reset_window_hours: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_quota: 100,
            reset_window_hours: 24,
        }
    }
}

/// Campaign matching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Half-width of the candidate window: a campaign qualifies when its
    /// `last_seen` is within this many days of the incident's start time.
    pub match_window_days: i64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            match_window_days: 7,
        }
    }
}

/// Text-generation collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Whether to call a configured generator at all. Template fallbacks
    /// are used when disabled.
    pub enabled: bool,
    /// Model identifier passed to the generator backend.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Hard timeout for a single generation call.
    pub timeout_secs: u64,
    /// How long research-scan reports stay cached, in hours.
    pub research_cache_hours: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "claude-haiku-4-5".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            timeout_secs: 20,
            research_cache_hours: 24,
        }
    }
}

/// Record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Snapshot path for the file-backed store. `None` keeps everything
    /// in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
    /// Bounded retry attempts for transient store failures.
    pub max_retries: u32,
    /// Initial backoff between retries, in milliseconds (doubles per attempt).
    pub initial_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            max_retries: 3,
            initial_backoff_ms: 50,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `WATCHFIRE_`)
/// 2. Working-directory config (`.watchfire/config.toml`)
/// 3. User config (`~/.config/watchfire/config.toml`)
/// 4. Built-in defaults
pub fn load_config(workdir: Option<&Path>) -> Result<EngineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("net", "watchfire", "watchfire") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Working-directory config
    if let Some(dir) = workdir {
        let local_config = dir.join(".watchfire").join("config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }
    }

    // Environment variables (WATCHFIRE_BUDGET__DEFAULT_QUOTA, etc.)
    figment = figment.merge(Env::prefixed("WATCHFIRE_").split("__"));

    figment.extract().map_err(Box::new)
}
