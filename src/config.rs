use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WhosNextError};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_MODELS: &[&str] = &["GradientBoosting", "RandomForest", "LogisticRegression"];
const MIN_TIMEOUT_MS: u64 = 500;
const MAX_TIMEOUT_MS: u64 = 120_000;
const MAX_BATCH_CONCURRENCY: usize = 32;

/// Main configuration structure loaded from whos_next.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub dashboard: DashboardConfig,
    pub batch: BatchConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Where the analytics service lives and how long to wait for it
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Per-request timeout. Requests are never retried automatically.
    pub request_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Dashboard behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub default_model: String,
    /// Fallback model list when the service cannot list its models
    pub models: Vec<String>,
    /// Start with every unit and sub-category selected
    pub select_all_on_start: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODELS[0].to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            select_all_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Scoring requests kept in flight while processing a CSV
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub api_token: Option<String>,
    pub log_level: String,
    /// File the configuration was read from, if any
    pub source: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            log_level: "whos_next=info".to_string(),
            source: None,
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        Self {
            api_token: std::env::var("WHOS_NEXT_API_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "whos_next=info".to_string()),
            source: None,
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Env file: WHOS_NEXT_ENV_FILE, else ./.env. Config file:
    /// WHOS_NEXT_CONFIG, else ./whos_next.toml, else the user config dir.
    pub fn load() -> Result<Self> {
        if let Ok(env_path) = std::env::var("WHOS_NEXT_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
        }

        let mut config = match Self::locate() {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| WhosNextError::Config {
                    message: format!("cannot read {}: {}", path.display(), e),
                })?;
                let mut config = Self::from_toml_str(&content)?;
                tracing::debug!("configuration loaded from {}", path.display());
                config.runtime.source = Some(path);
                config
            }
            None => {
                tracing::warn!("No whos_next.toml found, using defaults");
                Self::default()
            }
        };

        let source = config.runtime.source.take();
        config.runtime = RuntimeConfig::load_from_env();
        config.runtime.source = source;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn locate() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var("WHOS_NEXT_CONFIG") {
            return Some(PathBuf::from(explicit));
        }
        let local = PathBuf::from("whos_next.toml");
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("whos-next").join("config.toml"))
            .filter(|path| path.exists())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply env-style overrides through `lookup` (env-first).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("WHOS_NEXT_API_URL") {
            tracing::debug!("WHOS_NEXT_API_URL override applied");
            self.service.base_url = url;
        }
        if let Some(timeout) = lookup("WHOS_NEXT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.service.request_timeout_ms = timeout;
        }
        if let Some(model) = lookup("WHOS_NEXT_MODEL") {
            self.dashboard.default_model = model;
        }
        if let Some(n) = lookup("WHOS_NEXT_BATCH_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.batch.concurrency = n;
        }
    }

    /// Validate and clamp. Only an unusable model choice is fatal.
    pub fn validate(&mut self) -> Result<()> {
        let url = self.service.base_url.trim().trim_end_matches('/').to_string();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            tracing::warn!(
                "Service URL '{}' doesn't start with http:// or https://",
                self.service.base_url
            );
        }
        self.service.base_url = url;

        let clamped = self
            .service
            .request_timeout_ms
            .clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        if clamped != self.service.request_timeout_ms {
            tracing::warn!(
                "request_timeout_ms {} out of range, clamping to {}",
                self.service.request_timeout_ms,
                clamped
            );
            self.service.request_timeout_ms = clamped;
        }

        self.batch.concurrency = self.batch.concurrency.clamp(1, MAX_BATCH_CONCURRENCY);

        if self.dashboard.default_model.trim().is_empty() {
            return Err(WhosNextError::Config {
                message: "dashboard.default_model cannot be empty".into(),
            });
        }
        if self.dashboard.models.is_empty() {
            self.dashboard.models = vec![self.dashboard.default_model.clone()];
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.service.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [service]
            base_url = "https://hr.example.com/api/"
            "#,
        )
        .unwrap();
        assert_eq!(config.service.base_url, "https://hr.example.com/api/");
        assert_eq!(config.service.request_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.dashboard.default_model, "GradientBoosting");
        assert!(config.dashboard.select_all_on_start);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("WHOS_NEXT_API_URL", "http://10.0.0.5:9000"),
            ("WHOS_NEXT_TIMEOUT_MS", "2500"),
            ("WHOS_NEXT_MODEL", "RandomForest"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.service.base_url, "http://10.0.0.5:9000");
        assert_eq!(config.service.request_timeout_ms, 2500);
        assert_eq!(config.dashboard.default_model, "RandomForest");
    }

    #[test]
    fn validate_clamps_and_trims() {
        let mut config = Config::default();
        config.service.base_url = "http://localhost:8000/".into();
        config.service.request_timeout_ms = 10;
        config.batch.concurrency = 0;
        config.validate().unwrap();
        assert_eq!(config.service.base_url, "http://localhost:8000");
        assert_eq!(config.service.request_timeout_ms, MIN_TIMEOUT_MS);
        assert_eq!(config.batch.concurrency, 1);
    }

    #[test]
    fn empty_default_model_is_fatal() {
        let mut config = Config::default();
        config.dashboard.default_model = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = Config::from_toml_str("[service\nbase_url = 1").unwrap_err();
        assert!(matches!(err, WhosNextError::Config { .. }));
    }
}
