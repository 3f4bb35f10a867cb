//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Upstream adapters with per-provider circuit breakers
//! - Priority-ordered failover across providers
//! - A short-lived result cache used as a recent-success fallback
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod breaker;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod service;

#[cfg(test)]
mod testing;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use cache::{CacheEntry, ResultCache, normalize_key};
pub use config::{Config, ProviderConfig, ResilienceConfig};
pub use error::{ClassifiedError, ErrorKind, WeatherError};
pub use model::{Origin, WeatherObservation, WeatherReport};
pub use provider::{ProviderId, WeatherProvider};
pub use registry::ProviderRegistry;
pub use service::WeatherService;
