// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer identifier type for tracking scheduled timers.
//!
//! A `TimerId` is a structured, string-encoded composite key so the runtime
//! can route a fired timer back to the thing it belongs to (a job's
//! ack-timeout, a workflow instance's approval timeout, ...) without a
//! separate side table. Unlike [`crate::ids::AgentId`] and friends, a
//! `TimerId` is not backed by the fixed-size `IdBuf`: composite keys built
//! from two full ids comfortably exceed its 23-byte budget, so this is a
//! plain growable `String` newtype instead.

use crate::ids::{JobId, StepId, WorkflowInstanceId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(pub String);

impl TimerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn ack_timeout(job: &JobId) -> Self {
        TimerKind::AckTimeout(job.clone()).to_timer_id()
    }

    pub fn job_timeout(job: &JobId) -> Self {
        TimerKind::JobTimeout(job.clone()).to_timer_id()
    }

    pub fn unroutable_backoff(job: &JobId) -> Self {
        TimerKind::UnroutableBackoff(job.clone()).to_timer_id()
    }

    pub fn heartbeat_sweep() -> Self {
        TimerKind::HeartbeatSweep.to_timer_id()
    }

    pub fn idempotency_sweep() -> Self {
        TimerKind::IdempotencySweep.to_timer_id()
    }

    pub fn delay_done(instance: &WorkflowInstanceId, step: &StepId) -> Self {
        TimerKind::DelayDone { instance: instance.clone(), step: step.clone() }.to_timer_id()
    }

    pub fn approval_timeout(instance: &WorkflowInstanceId, step: &StepId) -> Self {
        TimerKind::ApprovalTimeout { instance: instance.clone(), step: step.clone() }.to_timer_id()
    }

    /// Parse this timer id into a typed [`TimerKind`].
    pub fn kind(&self) -> Option<TimerKind> {
        TimerKind::parse(self.as_str())
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TimerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Parsed representation of a timer id for type-safe routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    AckTimeout(JobId),
    JobTimeout(JobId),
    UnroutableBackoff(JobId),
    HeartbeatSweep,
    IdempotencySweep,
    DelayDone { instance: WorkflowInstanceId, step: StepId },
    ApprovalTimeout { instance: WorkflowInstanceId, step: StepId },
}

impl TimerKind {
    /// Parse a timer id string into a typed `TimerKind`. Returns `None` for
    /// unrecognized formats.
    pub fn parse(id: &str) -> Option<TimerKind> {
        if let Some(rest) = id.strip_prefix("ack-timeout:") {
            return Some(TimerKind::AckTimeout(JobId::from_string(rest)));
        }
        if let Some(rest) = id.strip_prefix("job-timeout:") {
            return Some(TimerKind::JobTimeout(JobId::from_string(rest)));
        }
        if let Some(rest) = id.strip_prefix("unroutable-backoff:") {
            return Some(TimerKind::UnroutableBackoff(JobId::from_string(rest)));
        }
        if id == "heartbeat-sweep" {
            return Some(TimerKind::HeartbeatSweep);
        }
        if id == "idempotency-sweep" {
            return Some(TimerKind::IdempotencySweep);
        }
        if let Some(rest) = id.strip_prefix("delay-done:") {
            let (instance, step) = rest.split_once(':')?;
            return Some(TimerKind::DelayDone {
                instance: WorkflowInstanceId::from_string(instance),
                step: StepId::new(step),
            });
        }
        if let Some(rest) = id.strip_prefix("approval-timeout:") {
            let (instance, step) = rest.split_once(':')?;
            return Some(TimerKind::ApprovalTimeout {
                instance: WorkflowInstanceId::from_string(instance),
                step: StepId::new(step),
            });
        }
        None
    }

    /// Format this `TimerKind` back into a canonical `TimerId`.
    pub fn to_timer_id(&self) -> TimerId {
        match self {
            TimerKind::AckTimeout(job) => TimerId::new(format!("ack-timeout:{job}")),
            TimerKind::JobTimeout(job) => TimerId::new(format!("job-timeout:{job}")),
            TimerKind::UnroutableBackoff(job) => {
                TimerId::new(format!("unroutable-backoff:{job}"))
            }
            TimerKind::HeartbeatSweep => TimerId::new("heartbeat-sweep"),
            TimerKind::IdempotencySweep => TimerId::new("idempotency-sweep"),
            TimerKind::DelayDone { instance, step } => {
                TimerId::new(format!("delay-done:{instance}:{}", step.as_str()))
            }
            TimerKind::ApprovalTimeout { instance, step } => {
                TimerId::new(format!("approval-timeout:{instance}:{}", step.as_str()))
            }
        }
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
