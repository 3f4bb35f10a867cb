use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path, path::PathBuf, time::Duration};

use crate::{breaker::BreakerConfig, provider::ProviderId};

/// Configuration for a single provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Defaults to the provider's public endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Lower is tried first. Defaults per provider (weatherstack 1, openweathermap 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// Only used by openweathermap; defaults to "AU".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            priority: None,
            country_code: None,
        }
    }
}

/// Circuit breaker and cache tuning, shared by every provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResilienceConfig {
    pub sliding_window_size: usize,
    pub failure_rate_threshold_percent: f64,
    pub wait_duration_in_open_state_ms: u64,
    pub permitted_calls_in_half_open_state: usize,
    pub call_timeout_ms: u64,
    pub cache_ttl_seconds: u64,
    /// How far past the TTL the all-providers-down fallback may still serve.
    pub stale_grace_seconds: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            sliding_window_size: 10,
            failure_rate_threshold_percent: 50.0,
            wait_duration_in_open_state_ms: 10_000,
            permitted_calls_in_half_open_state: 5,
            call_timeout_ms: 2_000,
            cache_ttl_seconds: 3,
            stale_grace_seconds: 0,
        }
    }
}

impl ResilienceConfig {
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            sliding_window_size: self.sliding_window_size,
            failure_rate_threshold: self.failure_rate_threshold_percent,
            wait_duration_in_open: Duration::from_millis(self.wait_duration_in_open_state_ms),
            permitted_calls_in_half_open: self.permitted_calls_in_half_open_state,
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn stale_grace(&self) -> Duration {
        Duration::from_secs(self.stale_grace_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sliding_window_size == 0 {
            bail!("resilience.sliding_window_size must be at least 1");
        }
        let threshold = self.failure_rate_threshold_percent;
        if !(threshold > 0.0 && threshold <= 100.0) {
            bail!(
                "resilience.failure_rate_threshold_percent must be in (0, 100], got {threshold}"
            );
        }
        if self.permitted_calls_in_half_open_state == 0 {
            bail!("resilience.permitted_calls_in_half_open_state must be at least 1");
        }
        if self.call_timeout_ms == 0 {
            bail!("resilience.call_timeout_ms must be greater than 0");
        }
        Ok(())
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Example TOML:
    /// [providers.weatherstack]
    /// api_key = "..."
    /// priority = 1
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub resilience: ResilienceConfig,
}

impl Config {
    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Load config from the default location, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load config from `path`, or return an empty default if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-task", "weather-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Set or replace a provider's API key, keeping its other settings.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .entry(provider_id.as_str().to_string())
            .and_modify(|cfg| cfg.api_key = api_key.clone())
            .or_insert_with(|| ProviderConfig::new(api_key));
    }

    pub fn upsert_provider(&mut self, provider_id: ProviderId, provider: ProviderConfig) {
        self.providers
            .insert(provider_id.as_str().to_string(), provider);
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers
            .get(provider_id.as_str())
            .map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }

    /// Configured providers in declaration order of [`ProviderId::all`].
    pub fn configured_providers(&self) -> Vec<ProviderId> {
        ProviderId::all()
            .iter()
            .copied()
            .filter(|id| self.is_provider_configured(*id))
            .collect()
    }

    /// Checks everything a request would otherwise trip over later:
    /// unknown provider names, blank keys, unparsable URLs and resilience ranges.
    pub fn validate(&self) -> Result<()> {
        for (name, provider) in &self.providers {
            let id = ProviderId::try_from(name.as_str())?;

            if provider.api_key.trim().is_empty() {
                bail!(
                    "Missing API key for provider '{id}'.\n\
                     Hint: run `weather configure {id}` and enter your API key."
                );
            }

            if let Some(base_url) = &provider.base_url {
                Url::parse(base_url)
                    .with_context(|| format!("Invalid base_url for provider '{id}': {base_url}"))?;
            }
        }

        self.resilience.validate()
    }
}
