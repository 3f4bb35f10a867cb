//! Failover walk over the provider registry.
//!
//! Providers are tried strictly in registry order. Only an
//! `UpstreamUnavailable` failure moves on to the next provider; any other
//! classified failure, an open circuit included, ends the walk at once.

use crate::{
    error::{ClassifiedError, WeatherError},
    model::WeatherObservation,
    registry::ProviderRegistry,
};

/// A successful walk: the observation and who produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub observation: WeatherObservation,
    pub provider: String,
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: ProviderRegistry,
}

impl Orchestrator {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn fetch(&self, city: &str) -> Result<Fetched, WeatherError> {
        if self.registry.is_empty() {
            return Err(WeatherError::NoProvidersAvailable);
        }

        let mut attempts: Vec<ClassifiedError> = Vec::new();

        for provider in self.registry.iter() {
            tracing::debug!(provider = provider.name(), city, "trying provider");

            match provider.fetch(city).await {
                Ok(observation) => {
                    if !attempts.is_empty() {
                        tracing::info!(
                            provider = provider.name(),
                            city,
                            failed_over = attempts.len(),
                            "served after failover"
                        );
                    }
                    return Ok(Fetched {
                        observation,
                        provider: provider.name().to_owned(),
                    });
                }
                Err(err) if err.kind.is_failover_eligible() => {
                    tracing::warn!(
                        provider = provider.name(),
                        city,
                        kind = %err.kind,
                        code = ?err.code,
                        "upstream unavailable, trying next provider"
                    );
                    attempts.push(err);
                }
                Err(err) => {
                    tracing::warn!(
                        provider = provider.name(),
                        city,
                        kind = %err.kind,
                        code = ?err.code,
                        "provider failed, not failing over"
                    );
                    return Err(WeatherError::Provider(err));
                }
            }
        }

        tracing::error!(city, attempts = attempts.len(), "all providers failed");
        Err(WeatherError::AllProvidersExhausted { attempts })
    }
}
