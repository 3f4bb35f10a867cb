//! Normalized failure taxonomy shared by adapters, the orchestrator and callers.
//!
//! Classification happens once, at the adapter boundary. Everything above it
//! only looks at [`ErrorKind`] to decide between failover, fail-fast and the
//! cache fallback.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    Unauthorized,
    RateLimited,
    /// Upstream reported itself down. The only kind worth trying the next provider for.
    UpstreamUnavailable,
    /// Circuit open, upstream not contacted.
    ProviderUnavailable,
    UnknownProviderFault,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::UnknownProviderFault => "unknown_provider_fault",
        }
    }

    pub fn is_failover_eligible(&self) -> bool {
        matches!(self, ErrorKind::UpstreamUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider failure after classification, with whatever the upstream told us.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider}: {kind}{}", fmt_detail(.code, .info))]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub provider: String,
    pub code: Option<i64>,
    pub info: Option<String>,
}

fn fmt_detail(code: &Option<i64>, info: &Option<String>) -> String {
    match (code, info) {
        (Some(code), Some(info)) => format!(" (code {code}: {info})"),
        (Some(code), None) => format!(" (code {code})"),
        (None, Some(info)) => format!(" ({info})"),
        (None, None) => String::new(),
    }
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, provider: impl Into<String>) -> Self {
        Self {
            kind,
            provider: provider.into(),
            code: None,
            info: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn circuit_open(provider: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProviderUnavailable, provider)
            .with_info("circuit breaker is open")
    }

    pub fn unknown(provider: impl Into<String>, info: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownProviderFault, provider)
            .with_info(info)
    }
}

/// Outcome of a whole weather request, as seen by the boundary layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeatherError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no weather providers available")]
    NoProvidersAvailable,

    #[error("all weather providers failed ({} attempted)", .attempts.len())]
    AllProvidersExhausted { attempts: Vec<ClassifiedError> },

    #[error(transparent)]
    Provider(#[from] ClassifiedError),
}

impl WeatherError {
    /// Normalized kind for status mapping. `None` for `NoProvidersAvailable`,
    /// which is a deployment problem rather than a provider outcome.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            WeatherError::InvalidInput(_) => Some(ErrorKind::InvalidInput),
            WeatherError::NoProvidersAvailable => None,
            WeatherError::AllProvidersExhausted { .. } => Some(ErrorKind::UpstreamUnavailable),
            WeatherError::Provider(err) => Some(err.kind),
        }
    }

    pub fn last_error(&self) -> Option<&ClassifiedError> {
        match self {
            WeatherError::AllProvidersExhausted { attempts } => attempts.last(),
            WeatherError::Provider(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_upstream_unavailable_is_failover_eligible() {
        let all = [
            ErrorKind::InvalidInput,
            ErrorKind::Unauthorized,
            ErrorKind::RateLimited,
            ErrorKind::UpstreamUnavailable,
            ErrorKind::ProviderUnavailable,
            ErrorKind::UnknownProviderFault,
        ];

        let eligible: Vec<_> = all.iter().filter(|k| k.is_failover_eligible()).collect();
        assert_eq!(eligible, vec![&ErrorKind::UpstreamUnavailable]);
    }

    #[test]
    fn display_includes_upstream_diagnostics() {
        let err = ClassifiedError::new(ErrorKind::RateLimited, "weatherstack")
            .with_code(104)
            .with_info("usage limit reached");

        assert_eq!(
            err.to_string(),
            "weatherstack: rate_limited (code 104: usage limit reached)"
        );
    }

    #[test]
    fn exhausted_reports_last_attempt() {
        let first = ClassifiedError::new(ErrorKind::UpstreamUnavailable, "a");
        let second = ClassifiedError::new(ErrorKind::UpstreamUnavailable, "b");
        let err = WeatherError::AllProvidersExhausted {
            attempts: vec![first, second.clone()],
        };

        assert_eq!(err.last_error(), Some(&second));
        assert_eq!(err.kind(), Some(ErrorKind::UpstreamUnavailable));
        assert!(err.to_string().contains("2 attempted"));
    }
}
