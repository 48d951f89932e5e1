// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orbitmesh_core::FakeClock;
use std::sync::atomic::{AtomicU32, Ordering};

fn config() -> ResilienceConfig {
    ResilienceConfig {
        retry_max: 3,
        retry_initial_delay_ms: 1,
        retry_max_delay_ms: 100,
        circuit_breaker_failure_ratio: 0.5,
        circuit_breaker_minimum_throughput: 4,
        circuit_breaker_break_duration_ms: 1_000,
        circuit_breaker_sampling_duration_ms: 60_000,
    }
}

#[test]
fn retry_delay_grows_exponentially_and_is_bounded() {
    let policy = RetryPolicy { max_attempts: 10, initial_delay_ms: 10, max_delay_ms: 60 };
    assert_eq!(policy.delay_for(1), Duration::from_millis(10));
    assert_eq!(policy.delay_for(2), Duration::from_millis(20));
    assert_eq!(policy.delay_for(3), Duration::from_millis(40));
    assert_eq!(policy.delay_for(4), Duration::from_millis(60));
}

#[tokio::test]
async fn retry_with_backoff_retries_transient_errors_until_success() {
    let policy = RetryPolicy::from_config(&config());
    let attempts = AtomicU32::new(0);

    let result: Result<u32, &str> = retry_with_backoff(&policy, |_e: &&str| true, || {
        let n = attempts.fetch_add(1, Ordering::SeqCst);
        async move { if n < 2 { Err("transient") } else { Ok(42) } }
    })
    .await;

    assert_eq!(result, Ok(42));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_with_backoff_gives_up_after_max_attempts() {
    let policy = RetryPolicy { max_attempts: 2, initial_delay_ms: 1, max_delay_ms: 10 };
    let attempts = AtomicU32::new(0);

    let result: Result<u32, &str> = retry_with_backoff(&policy, |_e: &&str| true, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async move { Err("always fails") }
    })
    .await;

    assert_eq!(result, Err("always fails"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_with_backoff_does_not_retry_non_retryable_errors() {
    let policy = RetryPolicy { max_attempts: 5, initial_delay_ms: 1, max_delay_ms: 10 };
    let attempts = AtomicU32::new(0);

    let result: Result<u32, &str> = retry_with_backoff(&policy, |_e: &&str| false, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async move { Err("permanent") }
    })
    .await;

    assert_eq!(result, Err("permanent"));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn circuit_breaker_trips_open_after_failure_ratio_exceeds_threshold_with_enough_throughput() {
    let clock = FakeClock::new();
    let breaker = CircuitBreaker::new(&config(), clock);

    breaker.record_success();
    breaker.record_failure();
    breaker.record_failure();
    breaker.record_failure();

    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!breaker.allow());
}

#[test]
fn circuit_breaker_stays_closed_below_minimum_throughput() {
    let clock = FakeClock::new();
    let breaker = CircuitBreaker::new(&config(), clock);

    breaker.record_failure();
    breaker.record_failure();

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(breaker.allow());
}

#[test]
fn circuit_breaker_half_opens_after_break_duration_and_recloses_on_success() {
    let clock = FakeClock::new();
    let breaker = CircuitBreaker::new(&config(), clock.clone());

    breaker.record_failure();
    breaker.record_failure();
    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance(Duration::from_millis(1_500));
    assert!(breaker.allow());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[test]
fn circuit_breaker_reopens_if_the_half_open_trial_fails() {
    let clock = FakeClock::new();
    let breaker = CircuitBreaker::new(&config(), clock.clone());

    breaker.record_failure();
    breaker.record_failure();
    breaker.record_failure();
    breaker.record_failure();
    clock.advance(Duration::from_millis(1_500));
    assert!(breaker.allow());

    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
}
