use chrono::Utc;

use crate::{
    cache::ResultCache,
    config::Config,
    error::WeatherError,
    model::{Origin, WeatherReport},
    orchestrator::Orchestrator,
    provider::providers_from_config,
    registry::ProviderRegistry,
};

/// Entry point for a weather lookup: input validation, provider failover and
/// the recent-success fallback.
///
/// The cache is only read after the provider walk failed; a live answer
/// always wins. With no providers configured at all the cache is not
/// consulted either.
#[derive(Debug, Clone)]
pub struct WeatherService {
    orchestrator: Orchestrator,
    cache: ResultCache,
}

impl WeatherService {
    pub fn new(registry: ProviderRegistry, cache: ResultCache) -> Self {
        Self {
            orchestrator: Orchestrator::new(registry),
            cache,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;

        let registry = ProviderRegistry::new(providers_from_config(config)?);
        let cache = ResultCache::new(config.resilience.cache_ttl())
            .with_stale_grace(config.resilience.stale_grace());

        tracing::info!(
            providers = ?registry.iter().map(|p| p.name()).collect::<Vec<_>>(),
            cache_ttl_secs = cache.ttl().as_secs(),
            stale_grace_secs = cache.stale_grace().as_secs(),
            "weather service ready"
        );

        Ok(Self::new(registry, cache))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        self.orchestrator.registry()
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn get_weather(&self, city: &str) -> Result<WeatherReport, WeatherError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(WeatherError::InvalidInput(
                "city must not be blank".to_string(),
            ));
        }

        tracing::info!(city, "fetching weather");

        let err = match self.orchestrator.fetch(city).await {
            Ok(fetched) => {
                self.cache.put(city, fetched.observation);
                return Ok(WeatherReport {
                    city: city.to_string(),
                    observation: fetched.observation,
                    origin: Origin::Live {
                        provider: fetched.provider,
                    },
                    fetched_at: Utc::now(),
                });
            }
            Err(WeatherError::NoProvidersAvailable) => {
                return Err(WeatherError::NoProvidersAvailable);
            }
            Err(err) => err,
        };

        let Some(entry) = self.cache.get_stale(city) else {
            return Err(err);
        };

        let age = entry.age();
        tracing::info!(
            city,
            age_ms = age.as_millis() as u64,
            error = %err,
            "serving cached result"
        );
        Ok(WeatherReport {
            city: city.to_string(),
            observation: entry.value,
            origin: Origin::Cached { age },
            fetched_at: entry.fetched_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind, model::WeatherObservation, provider::WeatherProvider,
        testing::ScriptedProvider,
    };
    use std::{sync::Arc, time::Duration};

    const TTL: Duration = Duration::from_secs(3);

    fn registry(providers: &[Arc<ScriptedProvider>]) -> ProviderRegistry {
        providers
            .iter()
            .map(|p| p.clone() as Arc<dyn WeatherProvider>)
            .collect()
    }

    fn service(providers: &[Arc<ScriptedProvider>]) -> WeatherService {
        WeatherService::new(registry(providers), ResultCache::new(TTL))
    }

    #[tokio::test]
    async fn blank_city_is_rejected_before_any_provider_call() {
        let provider = ScriptedProvider::new("ws", 1).ok(1.0, 1.0).shared();
        let svc = service(&[provider.clone()]);

        for city in ["", "   ", "\t"] {
            let err = svc.get_weather(city).await.unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::InvalidInput));
        }
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn success_is_written_under_normalized_key() {
        let ws = ScriptedProvider::new("ws", 1)
            .fail(ErrorKind::UpstreamUnavailable)
            .shared();
        let owm = ScriptedProvider::new("owm", 2).ok(20.0, 29.0).shared();
        let svc = service(&[ws.clone(), owm.clone()]);

        let report = svc.get_weather(" Melbourne ").await.unwrap();

        assert_eq!(report.observation, WeatherObservation::new(20.0, 29.0));
        assert_eq!(
            report.origin,
            Origin::Live {
                provider: "owm".into()
            }
        );
        assert_eq!(
            svc.cache().get("melbourne").unwrap().value,
            WeatherObservation::new(20.0, 29.0)
        );
        assert_eq!(ws.calls(), 1);
    }

    #[tokio::test]
    async fn live_result_wins_over_cache() {
        let ws = ScriptedProvider::new("ws", 1)
            .ok(20.0, 29.0)
            .ok(21.0, 30.0)
            .shared();
        let svc = service(&[ws.clone()]);

        svc.get_weather("melbourne").await.unwrap();
        let report = svc.get_weather("Melbourne").await.unwrap();

        assert_eq!(report.observation, WeatherObservation::new(21.0, 30.0));
        assert!(!report.origin.is_cached());
        assert_eq!(ws.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_with_warm_cache_serves_cached_value() {
        let ws = ScriptedProvider::new("ws", 1)
            .ok(20.0, 29.0)
            .fail(ErrorKind::UpstreamUnavailable)
            .shared();
        let owm = ScriptedProvider::new("owm", 2)
            .fail(ErrorKind::UpstreamUnavailable)
            .shared();
        let svc = service(&[ws, owm]);

        svc.get_weather("Melbourne").await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let report = svc.get_weather("melbourne").await.unwrap();
        assert_eq!(report.observation, WeatherObservation::new(20.0, 29.0));
        assert_eq!(
            report.origin,
            Origin::Cached {
                age: Duration::from_secs(2)
            }
        );
    }

    #[tokio::test]
    async fn exhaustion_with_cold_cache_propagates() {
        let ws = ScriptedProvider::new("ws", 1)
            .fail(ErrorKind::UpstreamUnavailable)
            .shared();
        let owm = ScriptedProvider::new("owm", 2)
            .fail(ErrorKind::UpstreamUnavailable)
            .shared();

        let svc = service(&[ws, owm]);
        let err = svc.get_weather("melbourne").await.unwrap_err();

        assert!(matches!(
            err,
            WeatherError::AllProvidersExhausted { ref attempts } if attempts.len() == 2
        ));
    }

    #[tokio::test]
    async fn fail_fast_error_also_falls_back_to_cache() {
        let ws = ScriptedProvider::new("ws", 1)
            .ok(20.0, 29.0)
            .fail(ErrorKind::Unauthorized)
            .shared();
        let owm = ScriptedProvider::new("owm", 2).ok(1.0, 1.0).shared();
        let svc = service(&[ws, owm.clone()]);

        svc.get_weather("melbourne").await.unwrap();
        let report = svc.get_weather("melbourne").await.unwrap();

        assert!(report.origin.is_cached());
        assert_eq!(owm.calls(), 0);
    }

    #[tokio::test]
    async fn fail_fast_error_with_cold_cache_keeps_its_kind() {
        let ws = ScriptedProvider::new("ws", 1)
            .fail(ErrorKind::RateLimited)
            .shared();

        let err = service(&[ws]).get_weather("melbourne").await.unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::RateLimited));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_not_served() {
        let ws = ScriptedProvider::new("ws", 1)
            .ok(20.0, 29.0)
            .fail(ErrorKind::UpstreamUnavailable)
            .shared();
        let svc = service(&[ws]);

        svc.get_weather("melbourne").await.unwrap();
        tokio::time::advance(TTL + Duration::from_millis(1)).await;

        let err = svc.get_weather("melbourne").await.unwrap_err();
        assert!(matches!(err, WeatherError::AllProvidersExhausted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_grace_extends_fallback_window() {
        let ws = ScriptedProvider::new("ws", 1)
            .ok(20.0, 29.0)
            .fail(ErrorKind::UpstreamUnavailable)
            .shared();
        let cache = ResultCache::new(TTL).with_stale_grace(Duration::from_secs(30));
        let svc = WeatherService::new(registry(&[ws]), cache);

        svc.get_weather("melbourne").await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        let report = svc.get_weather("melbourne").await.unwrap();
        assert!(report.origin.is_cached());
        assert!(svc.cache().get("melbourne").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cities_never_requested_again_are_evicted() {
        let ws = ScriptedProvider::new("ws", 1).ok(20.0, 29.0).shared();
        let svc = service(&[ws]);

        for i in 0..1000 {
            svc.get_weather(&format!("city{i}")).await.unwrap();
        }
        assert_eq!(svc.cache().len(), 1000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        svc.get_weather("melbourne").await.unwrap();

        assert_eq!(svc.cache().len(), 1);
        assert!(svc.cache().get("melbourne").is_some());
    }

    #[tokio::test]
    async fn empty_registry_skips_cache_fallback() {
        let svc = service(&[]);
        svc.cache()
            .put("melbourne", WeatherObservation::new(20.0, 29.0));

        let err = svc.get_weather("melbourne").await.unwrap_err();

        assert_eq!(err, WeatherError::NoProvidersAvailable);
    }

    #[tokio::test]
    async fn concurrent_requests_walk_independently() {
        let ws = ScriptedProvider::new("ws", 1).ok(20.0, 29.0).shared();
        let svc = service(&[ws.clone()]);

        let cities = ["melbourne", "sydney", "perth", "Melbourne"];
        let handles: Vec<_> = cities
            .iter()
            .map(|city| {
                let svc = svc.clone();
                let city = city.to_string();
                tokio::spawn(async move { svc.get_weather(&city).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(ws.calls(), 4);
        assert_eq!(svc.cache().len(), 3);
    }
}
