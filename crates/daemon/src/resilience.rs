// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resilience utility (§13): retry-with-backoff and a circuit breaker,
//! shared by whichever outward calls need them (today: the dispatcher's
//! agent sends; the engine's step executors wrap their own calls with
//! these too). Policy knobs come straight from [`crate::config::ResilienceConfig`].

use crate::config::ResilienceConfig;
use orbitmesh_core::Clock;
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Exponential backoff bounded by `max_delay_ms` (§6 "Resilience" knobs).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self { max_attempts: config.retry_max, initial_delay_ms: config.retry_initial_delay_ms, max_delay_ms: config.retry_max_delay_ms }
    }

    /// Delay before the `attempt`-th retry (1-indexed: `attempt == 1` is the
    /// delay before the first retry, after the initial try failed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = self.initial_delay_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(20)).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Retry `f` up to `policy.max_attempts` additional times, sleeping
/// `policy.delay_for(attempt)` between tries, as long as `is_retryable`
/// accepts the error. Returns the last error once attempts are exhausted
/// or `is_retryable` rejects it.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, is_retryable: impl Fn(&E) -> bool, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_attempts || !is_retryable(&error) {
                    return Err(error);
                }
                attempt += 1;
                let delay = policy.delay_for(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Window {
    started_at_ms: u64,
    successes: u32,
    failures: u32,
}

impl Window {
    fn new(now_ms: u64) -> Self {
        Self { started_at_ms: now_ms, successes: 0, failures: 0 }
    }

    fn total(&self) -> u32 {
        self.successes + self.failures
    }

    fn failure_ratio(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            f64::from(self.failures) / f64::from(self.total())
        }
    }
}

struct Inner {
    state: CircuitState,
    opened_at_ms: u64,
    window: Window,
}

/// A per-resource circuit breaker (§13, §6 "Resilience" knobs). `Closed`
/// tracks a rolling failure ratio over `sampling_duration_ms`; crossing
/// `failure_ratio` with at least `minimum_throughput` samples trips to
/// `Open`. After `break_duration_ms`, one trial call is let through as
/// `HalfOpen`; its outcome decides whether the circuit re-closes or re-opens.
pub struct CircuitBreaker<C: Clock> {
    clock: C,
    failure_ratio: f64,
    minimum_throughput: u32,
    break_duration_ms: u64,
    sampling_duration_ms: u64,
    inner: Mutex<Inner>,
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn new(config: &ResilienceConfig, clock: C) -> Self {
        let now_ms = clock.epoch_ms();
        Self {
            clock,
            failure_ratio: config.circuit_breaker_failure_ratio,
            minimum_throughput: config.circuit_breaker_minimum_throughput,
            break_duration_ms: config.circuit_breaker_break_duration_ms,
            sampling_duration_ms: config.circuit_breaker_sampling_duration_ms,
            inner: Mutex::new(Inner { state: CircuitState::Closed, opened_at_ms: 0, window: Window::new(now_ms) }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether a call may proceed right now. `Open` denies until
    /// `break_duration_ms` has passed, at which point exactly one caller
    /// transitions the breaker to `HalfOpen` and is allowed through.
    pub fn allow(&self) -> bool {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if now_ms.saturating_sub(inner.opened_at_ms) >= self.break_duration_ms {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.window = Window::new(now_ms);
            }
            CircuitState::Closed => {
                self.roll_window(&mut inner, now_ms);
                inner.window.successes += 1;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at_ms = now_ms;
                inner.window = Window::new(now_ms);
            }
            CircuitState::Closed => {
                self.roll_window(&mut inner, now_ms);
                inner.window.failures += 1;
                if inner.window.total() >= self.minimum_throughput && inner.window.failure_ratio() >= self.failure_ratio {
                    inner.state = CircuitState::Open;
                    inner.opened_at_ms = now_ms;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn roll_window(&self, inner: &mut Inner, now_ms: u64) {
        if now_ms.saturating_sub(inner.window.started_at_ms) > self.sampling_duration_ms {
            inner.window = Window::new(now_ms);
        }
    }
}

#[cfg(test)]
#[path = "resilience_tests.rs"]
mod tests;
