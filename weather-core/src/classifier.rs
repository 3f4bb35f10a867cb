//! Maps provider-specific failures onto [`ErrorKind`].
//!
//! Each upstream gets a rule table ([`Scheme`]); all of them feed the same
//! taxonomy. Pure functions only, no I/O.

use crate::error::{ClassifiedError, ErrorKind};

/// Raw failure as observed at the adapter boundary, before classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamFailure {
    pub status: Option<u16>,
    pub code: Option<i64>,
    pub error_type: Option<String>,
    pub info: Option<String>,
}

impl UpstreamFailure {
    /// Failure with no structured error payload (transport error, bad body, ...).
    pub fn unstructured(info: impl Into<String>) -> Self {
        Self {
            info: Some(info.into()),
            ..Self::default()
        }
    }

    pub fn coded(code: i64, error_type: Option<String>, info: Option<String>) -> Self {
        Self {
            code: Some(code),
            error_type,
            info,
            ..Self::default()
        }
    }
}

/// Rule table selector, one per upstream family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// WeatherStack-style numeric codes in a 200 body.
    WeatherStack,
    /// Upstream without usable codes: everything is an unknown fault.
    Flat,
}

pub fn classify_kind(scheme: Scheme, failure: &UpstreamFailure) -> ErrorKind {
    match scheme {
        Scheme::WeatherStack => weatherstack_kind(failure.code),
        Scheme::Flat => ErrorKind::UnknownProviderFault,
    }
}

fn weatherstack_kind(code: Option<i64>) -> ErrorKind {
    match code {
        Some(101) => ErrorKind::Unauthorized,
        Some(104) => ErrorKind::RateLimited,
        Some(601) => ErrorKind::InvalidInput,
        Some(615) => ErrorKind::UpstreamUnavailable,
        _ => ErrorKind::UnknownProviderFault,
    }
}

/// Classifies `failure` and keeps the upstream code and message for diagnostics.
pub fn classify(scheme: Scheme, provider: &str, failure: UpstreamFailure) -> ClassifiedError {
    let kind = classify_kind(scheme, &failure);
    let info = describe(scheme, &failure).or(failure.info);

    ClassifiedError {
        kind,
        provider: provider.to_owned(),
        code: failure.code,
        info,
    }
}

// 101 covers two situations upstream; tell them apart in the message only.
fn describe(scheme: Scheme, failure: &UpstreamFailure) -> Option<String> {
    if scheme != Scheme::WeatherStack || failure.code != Some(101) {
        return None;
    }

    let msg = match failure.error_type.as_deref() {
        Some("invalid_access_key") => "invalid API access key provided",
        _ => "missing API access key",
    };
    Some(msg.to_owned())
}
