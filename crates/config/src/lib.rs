//! Configuration loading, validation, and management for ChiefOps.
//!
//! Loads configuration from `~/.chiefops/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.chiefops/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Conversational memory: compaction and context budgets
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Retrieval service settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Entity resolution settings
    #[serde(default)]
    pub people: PeopleConfig,

    /// Persistence backend
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Turns always kept verbatim
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,

    /// Uncompacted turns tolerated before compaction is due
    #[serde(default = "default_compaction_trigger")]
    pub compaction_trigger: usize,

    /// Characters per estimated token
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    #[serde(default = "default_facts_budget")]
    pub facts_budget_tokens: usize,

    #[serde(default = "default_summary_budget")]
    pub summary_budget_tokens: usize,

    #[serde(default = "default_turns_budget")]
    pub turns_budget_tokens: usize,

    #[serde(default = "default_retrieval_budget")]
    pub retrieval_budget_tokens: usize,

    /// Per-turn character cap in the recent-turns layer
    #[serde(default = "default_turn_char_cap")]
    pub turn_char_cap: usize,

    /// Characters kept per turn by the extractive fallback summary
    #[serde(default = "default_extractive_chars")]
    pub extractive_chars_per_turn: usize,

    /// Extracted facts below this confidence are dropped
    #[serde(default = "default_min_fact_confidence")]
    pub min_fact_confidence: f32,
}

fn default_recent_window() -> usize {
    10
}
fn default_compaction_trigger() -> usize {
    15
}
fn default_chars_per_token() -> usize {
    4
}
fn default_facts_budget() -> usize {
    2000
}
fn default_summary_budget() -> usize {
    3000
}
fn default_turns_budget() -> usize {
    4000
}
fn default_retrieval_budget() -> usize {
    3000
}
fn default_turn_char_cap() -> usize {
    1000
}
fn default_extractive_chars() -> usize {
    200
}
fn default_min_fact_confidence() -> f32 {
    0.6
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_window: default_recent_window(),
            compaction_trigger: default_compaction_trigger(),
            chars_per_token: default_chars_per_token(),
            facts_budget_tokens: default_facts_budget(),
            summary_budget_tokens: default_summary_budget(),
            turns_budget_tokens: default_turns_budget(),
            retrieval_budget_tokens: default_retrieval_budget(),
            turn_char_cap: default_turn_char_cap(),
            extractive_chars_per_turn: default_extractive_chars(),
            min_fact_confidence: default_min_fact_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Chunks requested from the retrieval service per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeopleConfig {
    /// Minimum name similarity for a fuzzy merge (inclusive)
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

fn default_fuzzy_threshold() -> f64 {
    0.85
}

impl Default for PeopleConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// SQLite database path; defaults to `~/.chiefops/chiefops.sqlite`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "sqlite".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

impl StorageConfig {
    /// The effective database path.
    pub fn db_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("chiefops.sqlite"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.chiefops/config.toml).
    ///
    /// Environment overrides:
    /// - `CHIEFOPS_STORAGE_BACKEND`
    /// - `CHIEFOPS_DB_PATH`
    /// - `CHIEFOPS_RETRIEVAL_TOP_K`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(backend) = std::env::var("CHIEFOPS_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }

        if let Ok(path) = std::env::var("CHIEFOPS_DB_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }

        if let Ok(top_k) = std::env::var("CHIEFOPS_RETRIEVAL_TOP_K") {
            self.retrieval.top_k = top_k.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CHIEFOPS_RETRIEVAL_TOP_K must be a positive integer, got '{top_k}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chiefops")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let memory = &self.memory;

        if memory.recent_window == 0 {
            return Err(ConfigError::ValidationError(
                "memory.recent_window must be at least 1".into(),
            ));
        }

        if memory.compaction_trigger < memory.recent_window {
            return Err(ConfigError::ValidationError(
                "memory.compaction_trigger must be >= memory.recent_window".into(),
            ));
        }

        if memory.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "memory.chars_per_token must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&memory.min_fact_confidence) {
            return Err(ConfigError::ValidationError(
                "memory.min_fact_confidence must be between 0.0 and 1.0".into(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.people.fuzzy_threshold) {
            return Err(ConfigError::ValidationError(
                "people.fuzzy_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        match self.storage.backend.as_str() {
            "sqlite" | "in_memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "storage.backend must be \"sqlite\" or \"in_memory\", got \"{other}\""
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.recent_window, 10);
        assert_eq!(config.memory.compaction_trigger, 15);
        assert_eq!(config.storage.backend, "sqlite");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.memory.turns_budget_tokens, config.memory.turns_budget_tokens);
        assert_eq!(parsed.people.fuzzy_threshold, config.people.fuzzy_threshold);
    }

    #[test]
    fn trigger_below_window_rejected() {
        let config = AppConfig {
            memory: MemoryConfig {
                recent_window: 20,
                compaction_trigger: 5,
                ..MemoryConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_top_k_rejected() {
        let config = AppConfig {
            retrieval: RetrievalConfig { top_k: 0 },
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retrieval.top_k"));
    }

    #[test]
    fn zero_top_k_in_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\ntop_k = 0\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn unknown_backend_rejected() {
        let config = AppConfig {
            storage: StorageConfig {
                backend: "mongo".into(),
                path: None,
            },
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mongo"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().retrieval.top_k, 5);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[memory]
recent_window = 6
compaction_trigger = 12

[storage]
backend = "in_memory"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.memory.recent_window, 6);
        assert_eq!(config.memory.compaction_trigger, 12);
        assert_eq!(config.memory.chars_per_token, 4);
        assert_eq!(config.storage.backend, "in_memory");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[memory\nrecent_window = ").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("recent_window"));
        assert!(toml_str.contains("fuzzy_threshold"));
    }

    #[test]
    fn db_path_defaults_under_config_dir() {
        let storage = StorageConfig::default();
        assert!(storage.db_path().ends_with(".chiefops/chiefops.sqlite"));
    }
}
