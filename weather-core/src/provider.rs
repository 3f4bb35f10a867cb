use crate::{
    Config, WeatherObservation,
    breaker::BreakerConfig,
    error::ClassifiedError,
    provider::{openweathermap::OpenWeatherMapProvider, weatherstack::WeatherStackProvider},
};
use async_trait::async_trait;
use reqwest::Client;
use std::{convert::TryFrom, fmt::Debug, sync::Arc};

pub mod openweathermap;
pub mod weatherstack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    WeatherStack,
    OpenWeatherMap,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::WeatherStack => "weatherstack",
            ProviderId::OpenWeatherMap => "openweathermap",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::WeatherStack, ProviderId::OpenWeatherMap]
    }

    /// Lower is tried first.
    pub fn default_priority(&self) -> i32 {
        match self {
            ProviderId::WeatherStack => 1,
            ProviderId::OpenWeatherMap => 2,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::WeatherStack => "http://api.weatherstack.com",
            ProviderId::OpenWeatherMap => "https://api.openweathermap.org/data/2.5",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "weatherstack" => Ok(ProviderId::WeatherStack),
            "openweathermap" => Ok(ProviderId::OpenWeatherMap),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: weatherstack, openweathermap."
            )),
        }
    }
}

/// Where and how to reach one upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
    pub priority: i32,
}

/// One upstream weather source.
///
/// Implementations classify their own failures and run every upstream call
/// through their circuit breaker, so callers only ever see [`ClassifiedError`].
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(&self, city: &str) -> Result<WeatherObservation, ClassifiedError>;

    fn name(&self) -> &str;

    fn priority(&self) -> i32;
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
    http: Client,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let provider = config.provider_config(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `weather configure {id}` and enter your API key."
        )
    })?;

    let endpoint = Endpoint {
        base_url: provider
            .base_url
            .clone()
            .unwrap_or_else(|| id.default_base_url().to_owned()),
        api_key: provider.api_key.clone(),
        priority: provider.priority.unwrap_or_else(|| id.default_priority()),
    };
    let breaker: BreakerConfig = config.resilience.breaker_config();

    let shared: Arc<dyn WeatherProvider> = match id {
        ProviderId::WeatherStack => Arc::new(WeatherStackProvider::new(endpoint, http, breaker)),
        ProviderId::OpenWeatherMap => {
            let mut owm = OpenWeatherMapProvider::new(endpoint, http, breaker);
            if let Some(country) = &provider.country_code {
                owm = owm.with_country_code(country.clone());
            }
            Arc::new(owm)
        }
    };

    Ok(shared)
}

/// Every configured provider, sharing one HTTP client. Order is irrelevant here;
/// the registry sorts by priority.
pub fn providers_from_config(config: &Config) -> anyhow::Result<Vec<Arc<dyn WeatherProvider>>> {
    let http = Client::new();

    config
        .configured_providers()
        .into_iter()
        .map(|id| provider_from_config(id, config, http.clone()))
        .collect()
}

/// Keeps upstream bodies short enough for logs and error messages.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
