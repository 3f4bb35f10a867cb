use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::{
    breaker::{BreakerConfig, CircuitBreaker},
    classifier::{Scheme, UpstreamFailure, classify},
    error::ClassifiedError,
    model::WeatherObservation,
    provider::{Endpoint, truncate_body},
};

use super::WeatherProvider;

const NAME: &str = "openweathermap";
const DEFAULT_COUNTRY_CODE: &str = "AU";
const UNITS: &str = "metric";

/// OpenWeatherMap gives no codes worth acting on, so every failure is an
/// unknown fault and never triggers failover.
#[derive(Debug)]
pub struct OpenWeatherMapProvider {
    endpoint: Endpoint,
    country_code: String,
    http: Client,
    breaker: CircuitBreaker,
}

impl OpenWeatherMapProvider {
    pub fn new(endpoint: Endpoint, http: Client, breaker: BreakerConfig) -> Self {
        Self {
            endpoint,
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            http,
            breaker: CircuitBreaker::new(NAME, breaker),
        }
    }

    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = country_code.into();
        self
    }

    pub fn request_url(&self, city: &str) -> Result<Url, ClassifiedError> {
        let url = format!("{}/weather", self.endpoint.base_url.trim_end_matches('/'));
        let query = format!("{city},{}", self.country_code);
        let params = [
            ("q", query.as_str()),
            ("appid", self.endpoint.api_key.as_str()),
            ("units", UNITS),
        ];

        Url::parse_with_params(&url, &params)
            .map_err(|e| ClassifiedError::unknown(NAME, format!("invalid request url: {e}")))
    }

    async fn fetch_current(&self, city: &str) -> Result<WeatherObservation, ClassifiedError> {
        let url = self.request_url(city)?;
        tracing::debug!(provider = NAME, city, "requesting current weather");

        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| request_failed("failed to send request", e))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| request_failed("failed to read response body", e))?;

        parse_response(status.as_u16(), &body)
    }
}

fn failure(info: String) -> ClassifiedError {
    classify(Scheme::Flat, NAME, UpstreamFailure::unstructured(info))
}

fn request_failed(context: &str, err: reqwest::Error) -> ClassifiedError {
    failure(format!("{context}: {}", err.without_url()))
}

pub(crate) fn parse_response(
    status: u16,
    body: &str,
) -> Result<WeatherObservation, ClassifiedError> {
    if !(200..300).contains(&status) {
        let detail = serde_json::from_str::<OwmError>(body)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or_else(|| truncate_body(body));
        return Err(failure(format!("status {status}: {detail}")));
    }

    let parsed: OwmResponse =
        serde_json::from_str(body).map_err(|e| failure(format!("malformed response: {e}")))?;

    let wind_speed = parsed.wind.and_then(|w| w.speed);
    let temperature = parsed.main.and_then(|m| m.temp);

    match (wind_speed, temperature) {
        (Some(wind_speed), Some(temperature)) => {
            Ok(WeatherObservation::new(wind_speed, temperature))
        }
        _ => Err(failure("missing current weather data".to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    main: Option<OwmMain>,
    wind: Option<OwmWind>,
}

#[derive(Debug, Deserialize)]
struct OwmError {
    message: Option<String>,
}

#[async_trait]
impl WeatherProvider for OpenWeatherMapProvider {
    async fn fetch(&self, city: &str) -> Result<WeatherObservation, ClassifiedError> {
        self.breaker.call(self.fetch_current(city)).await
    }

    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> i32 {
        self.endpoint.priority
    }
}
