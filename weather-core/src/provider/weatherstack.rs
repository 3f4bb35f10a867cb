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

const NAME: &str = "weatherstack";

#[derive(Debug)]
pub struct WeatherStackProvider {
    endpoint: Endpoint,
    http: Client,
    breaker: CircuitBreaker,
}

impl WeatherStackProvider {
    pub fn new(endpoint: Endpoint, http: Client, breaker: BreakerConfig) -> Self {
        Self {
            endpoint,
            http,
            breaker: CircuitBreaker::new(NAME, breaker),
        }
    }

    pub fn request_url(&self, city: &str) -> Result<Url, ClassifiedError> {
        let url = format!("{}/current", self.endpoint.base_url.trim_end_matches('/'));
        let params = [
            ("access_key", self.endpoint.api_key.as_str()),
            ("query", city),
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

fn failure(upstream: UpstreamFailure) -> ClassifiedError {
    classify(Scheme::WeatherStack, NAME, upstream)
}

fn transport(info: String) -> ClassifiedError {
    failure(UpstreamFailure::unstructured(info))
}

fn request_failed(context: &str, err: reqwest::Error) -> ClassifiedError {
    transport(format!("{context}: {}", err.without_url()))
}

/// Turns a raw WeatherStack reply into an observation or a classified error.
///
/// WeatherStack reports errors inside a 200 body, so the error object wins
/// over the status code when both are present.
pub(crate) fn parse_response(
    status: u16,
    body: &str,
) -> Result<WeatherObservation, ClassifiedError> {
    let parsed = serde_json::from_str::<WsResponse>(body);

    let error = parsed.as_ref().ok().and_then(|r| r.error.as_ref());
    if let Some(err) = error {
        let upstream = UpstreamFailure::coded(err.code, err.error_type.clone(), err.info.clone());
        return Err(failure(upstream));
    }

    if !(200..300).contains(&status) {
        return Err(failure(UpstreamFailure {
            status: Some(status),
            info: Some(format!("status {status}: {}", truncate_body(body))),
            ..UpstreamFailure::default()
        }));
    }

    let parsed = parsed.map_err(|e| transport(format!("malformed response: {e}")))?;

    let current = parsed.current.as_ref();
    let wind_speed = current.and_then(|c| c.wind_speed);
    let temperature = current.and_then(|c| c.temperature);

    match (wind_speed, temperature) {
        (Some(wind_speed), Some(temperature)) => {
            Ok(WeatherObservation::new(wind_speed, temperature))
        }
        _ => Err(transport("missing current weather data".to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct WsCurrent {
    temperature: Option<f64>,
    wind_speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WsError {
    code: i64,
    #[serde(rename = "type")]
    error_type: Option<String>,
    info: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsResponse {
    current: Option<WsCurrent>,
    error: Option<WsError>,
}

#[async_trait]
impl WeatherProvider for WeatherStackProvider {
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
