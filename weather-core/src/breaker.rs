//! Per-provider circuit breaker.
//!
//! ```text
//! Closed   -> Open      failure rate of a full window >= threshold
//! Open     -> HalfOpen  first call after the cooldown
//! HalfOpen -> Closed    every permitted probe succeeded
//! HalfOpen -> Open      any probe failed
//! ```
//!
//! All state lives behind one mutex, so concurrent callers always see a
//! consistent machine. The lock is never held across an await.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ClassifiedError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    pub sliding_window_size: usize,
    /// Percentage in `(0, 100]`.
    pub failure_rate_threshold: f64,
    pub wait_duration_in_open: Duration,
    pub permitted_calls_in_half_open: usize,
    pub call_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            sliding_window_size: 10,
            failure_rate_threshold: 50.0,
            wait_duration_in_open: Duration::from_secs(10),
            permitted_calls_in_half_open: 5,
            call_timeout: Duration::from_secs(2),
        }
    }
}

/// Point-in-time view of a breaker, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitMetrics {
    pub state: CircuitState,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub failure_rate: f64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// `true` marks a failed call. Only used while closed.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    probes_issued: usize,
    probes_succeeded: usize,
    /// Bumped on every transition so late outcomes from an older state are dropped.
    generation: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(config.sliding_window_size),
                opened_at: None,
                probes_issued: 0,
                probes_succeeded: 0,
                generation: 0,
            }),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn metrics(&self) -> CircuitMetrics {
        let inner = self.lock();
        let failed_calls = inner.window.iter().filter(|failed| **failed).count();
        let buffered_calls = inner.window.len();
        let failure_rate = if buffered_calls == 0 {
            0.0
        } else {
            failed_calls as f64 * 100.0 / buffered_calls as f64
        };

        CircuitMetrics {
            state: inner.state,
            buffered_calls,
            failed_calls,
            failure_rate,
        }
    }

    /// Runs `call` through the breaker with the configured call timeout.
    ///
    /// Rejected calls never poll `call` and fail with `ProviderUnavailable`.
    /// A timeout is reported as `UnknownProviderFault` and counts as a failure.
    /// `InvalidInput` counts as a success: the upstream answered.
    pub async fn call<T, F>(&self, call: F) -> Result<T, ClassifiedError>
    where
        F: Future<Output = Result<T, ClassifiedError>>,
    {
        let Some(permit) = self.try_acquire() else {
            tracing::debug!(provider = %self.name, "circuit open, call rejected");
            return Err(ClassifiedError::circuit_open(&self.name));
        };

        let timeout = self.config.call_timeout;
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ClassifiedError::unknown(
                &self.name,
                format!("call timed out after {} ms", timeout.as_millis()),
            )),
        };

        match &result {
            Ok(_) => permit.record(false),
            Err(err) => permit.record(err.kind != ErrorKind::InvalidInput),
        }

        result
    }

    /// Asks for permission to call upstream. `None` means the circuit rejects the call.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let wait = self.config.wait_duration_in_open;
            let cooled_down = inner.opened_at.is_some_and(|at| at.elapsed() >= wait);
            if !cooled_down {
                return None;
            }
            self.transition(&mut inner, CircuitState::HalfOpen);
        }

        let probe = inner.state == CircuitState::HalfOpen;
        if probe {
            if inner.probes_issued >= self.config.permitted_calls_in_half_open {
                return None;
            }
            inner.probes_issued += 1;
        }

        Some(Permit {
            breaker: self,
            generation: inner.generation,
            probe,
            recorded: false,
        })
    }

    fn on_outcome(&self, generation: u64, failed: bool) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }

        let state = inner.state;
        match state {
            CircuitState::Closed => {
                inner.window.push_back(failed);
                while inner.window.len() > self.config.sliding_window_size {
                    inner.window.pop_front();
                }
                if inner.window.len() == self.config.sliding_window_size {
                    let failures = inner.window.iter().filter(|f| **f).count();
                    let rate = failures as f64 * 100.0 / inner.window.len() as f64;
                    if rate >= self.config.failure_rate_threshold {
                        tracing::warn!(
                            provider = %self.name,
                            failure_rate = rate,
                            threshold = self.config.failure_rate_threshold,
                            "failure rate threshold reached"
                        );
                        self.transition(&mut inner, CircuitState::Open);
                    }
                }
            }
            CircuitState::HalfOpen if failed => self.transition(&mut inner, CircuitState::Open),
            CircuitState::HalfOpen => {
                inner.probes_succeeded += 1;
                if inner.probes_succeeded >= self.config.permitted_calls_in_half_open {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_abandoned(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.state == CircuitState::HalfOpen {
            inner.probes_issued = inner.probes_issued.saturating_sub(1);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }

        match to {
            CircuitState::Open => {
                tracing::warn!(provider = %self.name, ?from, "circuit opened");
            }
            _ => tracing::info!(provider = %self.name, ?from, ?to, "circuit state transition"),
        }

        inner.state = to;
        inner.generation += 1;
        inner.window.clear();
        inner.probes_issued = 0;
        inner.probes_succeeded = 0;
        inner.opened_at = (to == CircuitState::Open).then(Instant::now);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing panics while holding the lock, so poisoned state is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Permission for one upstream call.
///
/// Dropping it without recording (e.g. the request was cancelled) hands a
/// half-open probe slot back without touching the window.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    recorded: bool,
}

impl Permit<'_> {
    pub fn record(mut self, failed: bool) {
        self.recorded = true;
        self.breaker.on_outcome(self.generation, failed);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.recorded && self.probe {
            self.breaker.on_abandoned(self.generation);
        }
    }
}
