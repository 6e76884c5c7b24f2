//! Client configuration and service factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use timebox_core::config::EngineConfig;
use timebox_core::retry::RetryPolicy;
use timebox_core::traits::AssessmentService;

use crate::http::HttpAssessmentService;

/// Retry settings for one kind of backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self, attempt_timeout: Duration) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            attempt_timeout,
        }
    }
}

/// Autosave settings: retry plus the coalescing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Edits to one question within this window are sent once.
    pub coalesce_window_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            initial_backoff_ms: retry.initial_backoff_ms,
            max_backoff_ms: retry.max_backoff_ms,
            coalesce_window_ms: 300,
        }
    }
}

impl AutosaveConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

/// Top-level timebox configuration.
///
/// Note: Custom Debug impl masks the API token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeboxConfig {
    /// Root URL of the assessment backend.
    pub base_url: String,
    /// Bearer token; empty means no `Authorization` header.
    pub api_token: String,
    /// Per-request deadline, applied to every attempt.
    pub request_timeout_ms: u64,
    /// How often the countdown publishes the remaining time.
    pub tick_interval_ms: u64,
    pub load: RetryConfig,
    pub autosave: AutosaveConfig,
    pub finish: RetryConfig,
}

impl Default for TimeboxConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_token: String::new(),
            request_timeout_ms: 15_000,
            tick_interval_ms: 1_000,
            load: RetryConfig::default(),
            autosave: AutosaveConfig::default(),
            finish: RetryConfig {
                max_attempts: 4,
                ..RetryConfig::default()
            },
        }
    }
}

impl std::fmt::Debug for TimeboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeboxConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"***")
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("tick_interval_ms", &self.tick_interval_ms)
            .field("load", &self.load)
            .field("autosave", &self.autosave)
            .field("finish", &self.finish)
            .finish()
    }
}

impl TimeboxConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Engine tunables derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        let timeout = self.request_timeout();
        EngineConfig {
            load_retry: self.load.policy(timeout),
            autosave_retry: self.autosave.retry().policy(timeout),
            finish_retry: self.finish.policy(timeout),
            autosave_window: Duration::from_millis(self.autosave.coalesce_window_ms),
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `timebox.toml` in the current directory
/// 2. `~/.config/timebox/config.toml`
///
/// Environment variable overrides: `TIMEBOX_BASE_URL`, `TIMEBOX_API_TOKEN`.
pub fn load_config() -> Result<TimeboxConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<TimeboxConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("timebox.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!("loading config from {}", path.display());
            toml::from_str::<TimeboxConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => TimeboxConfig::default(),
    };

    if let Ok(url) = std::env::var("TIMEBOX_BASE_URL") {
        config.base_url = url;
    }
    if let Ok(token) = std::env::var("TIMEBOX_API_TOKEN") {
        config.api_token = token;
    }

    config.base_url = resolve_env_vars(&config.base_url);
    config.api_token = resolve_env_vars(&config.api_token);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("timebox"))
}

/// Create the HTTP assessment service described by `config`.
pub fn create_service(config: &TimeboxConfig) -> Result<Arc<dyn AssessmentService>> {
    let service =
        HttpAssessmentService::new(&config.base_url, &config.api_token, config.request_timeout())?;
    Ok(Arc::new(service))
}
