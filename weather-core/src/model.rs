use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Canonical current-weather reading, whatever upstream produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub wind_speed: f64,
    pub temperature_degrees: f64,
}

impl WeatherObservation {
    pub const fn new(wind_speed: f64, temperature_degrees: f64) -> Self {
        Self {
            wind_speed,
            temperature_degrees,
        }
    }
}

/// Where a served observation came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Origin {
    /// Fetched from an upstream during this request.
    Live { provider: String },
    /// Served from the result cache because every provider failed.
    Cached { age: Duration },
}

impl Origin {
    pub fn is_cached(&self) -> bool {
        matches!(self, Origin::Cached { .. })
    }
}

/// What the service hands back to the boundary layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub city: String,
    pub observation: WeatherObservation,
    pub origin: Origin,
    pub fetched_at: DateTime<Utc>,
}
