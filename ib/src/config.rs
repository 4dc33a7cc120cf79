//! Configuration types and loading
//!
//! One JSON file at `<config-home>/invisibrow.json`. Every key has a
//! default, so a missing or partial file is fine. Credentials come from
//! the environment, never from the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable checked for the API key by default
pub const DEFAULT_API_KEY_ENV: &str = "INVISIBROW_API_KEY";

/// Environment variable overriding the LLM base URL
pub const BASE_URL_ENV: &str = "INVISIBROW_BASE_URL";

/// Environment flag enabling deterministic mock execution
pub const UI_TEST_ENV: &str = "UI_TEST";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model per agent role
    pub models: ModelsConfig,

    /// Worker-pool limits
    pub concurrency: ConcurrencyConfig,

    /// LLM endpoint settings
    pub llm: LlmConfig,

    /// Storage location override
    pub storage: StorageConfig,
}

impl Config {
    /// Load from an explicit path, else `<config-home>/invisibrow.json`,
    /// else defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("invisibrow.json");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_json::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Storage root: configured override or
    /// `<data-home>/invisibrow/storage`
    pub fn storage_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("invisibrow")
                .join("storage")
        })
    }

    /// True when deterministic mock execution is requested
    pub fn mock_mode() -> bool {
        std::env::var(UI_TEST_ENV).map(|v| v == "1" || v == "true").unwrap_or(false)
    }
}

/// Which model serves each agent role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub planner_agent: String,
    pub executor_agent: String,
    pub watchdog_agent: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            planner_agent: "gpt-5".to_string(),
            executor_agent: "gpt-5-mini".to_string(),
            watchdog_agent: "gpt-5-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum tasks executing at once; additional submissions wait FIFO
    pub max_tasks: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_tasks: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Chat completions base URL; `INVISIBROW_BASE_URL` overrides
    pub base_url: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            base_url: "https://api.openai.com".to_string(),
            timeout_ms: 120_000,
        }
    }
}

impl LlmConfig {
    pub fn resolve_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("API key not set (expected in {})", self.api_key_env))
    }

    pub fn resolve_base_url(&self) -> String {
        std::env::var(BASE_URL_ENV).unwrap_or_else(|_| self.base_url.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the storage root (tests, portable installs)
    pub data_dir: Option<PathBuf>,
}
