// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ids::{JobId, StepId, WorkflowInstanceId};

#[test]
fn ack_timeout_round_trips() {
    let job = JobId::from_string("job-abc");
    let id = TimerId::ack_timeout(&job);
    assert_eq!(id.kind(), Some(TimerKind::AckTimeout(job)));
}

#[test]
fn job_timeout_round_trips() {
    let job = JobId::from_string("job-abc");
    let id = TimerId::job_timeout(&job);
    assert_eq!(id.kind(), Some(TimerKind::JobTimeout(job)));
}

#[test]
fn unroutable_backoff_round_trips() {
    let job = JobId::from_string("job-abc");
    let id = TimerId::unroutable_backoff(&job);
    assert_eq!(id.kind(), Some(TimerKind::UnroutableBackoff(job)));
}

#[test]
fn heartbeat_sweep_round_trips() {
    let id = TimerId::heartbeat_sweep();
    assert_eq!(id.as_str(), "heartbeat-sweep");
    assert_eq!(id.kind(), Some(TimerKind::HeartbeatSweep));
}

#[test]
fn idempotency_sweep_round_trips() {
    let id = TimerId::idempotency_sweep();
    assert_eq!(id.as_str(), "idempotency-sweep");
    assert_eq!(id.kind(), Some(TimerKind::IdempotencySweep));
}

#[test]
fn delay_done_round_trips() {
    let instance = WorkflowInstanceId::from_string("wfi-xyz");
    let step = StepId::new("fetch");
    let id = TimerId::delay_done(&instance, &step);
    assert_eq!(
        id.kind(),
        Some(TimerKind::DelayDone { instance, step })
    );
}

#[test]
fn approval_timeout_round_trips() {
    let instance = WorkflowInstanceId::from_string("wfi-xyz");
    let step = StepId::new("review");
    let id = TimerId::approval_timeout(&instance, &step);
    assert_eq!(
        id.kind(),
        Some(TimerKind::ApprovalTimeout { instance, step })
    );
}

#[test]
fn unrecognized_timer_id_parses_to_none() {
    assert_eq!(TimerKind::parse("not-a-timer"), None);
    assert_eq!(TimerKind::parse("delay-done:only-one-part"), None);
}

#[test]
fn timer_id_display_matches_as_str() {
    let id = TimerId::heartbeat_sweep();
    assert_eq!(id.to_string(), id.as_str());
}
