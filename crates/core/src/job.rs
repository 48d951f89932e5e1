// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and its state machine (§3, §4.3).

use crate::error::{CoreError, CoreResult};
use crate::ids::{AgentId, Capability, IdempotencyKey, JobId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Delivery and response shape for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPattern {
    FireAndForget,
    RequestResponse,
    Streaming,
    LongRunning,
}

crate::simple_display! {
    JobPattern {
        FireAndForget => "fire_and_forget",
        RequestResponse => "request_response",
        Streaming => "streaming",
        LongRunning => "long_running",
    }
}

/// Status of a [`Job`]. See §4.3 for the allowed transition arrows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobStatus {
    /// Terminal statuses are immutable (§3 invariant).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut
        )
    }
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Assigned => "assigned",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        TimedOut => "timed_out",
    }
}

/// Caller-supplied request to enqueue a job (§4.5 `Enqueue(JobRequest)`).
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub idempotency_key: Option<IdempotencyKey>,
    pub command: String,
    pub payload: Vec<u8>,
    pub priority: i32,
    pub pattern: JobPattern,
    pub timeout_ms: u64,
    pub target_agent_id: Option<AgentId>,
    pub target_group: Option<String>,
    pub required_capabilities: BTreeSet<Capability>,
}

impl JobRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            idempotency_key: None,
            command: command.into(),
            payload: Vec::new(),
            priority: 0,
            pattern: JobPattern::RequestResponse,
            timeout_ms: 30_000,
            target_agent_id: None,
            target_group: None,
            required_capabilities: BTreeSet::new(),
        }
    }
}

impl JobRequest {
    crate::setters! {
        set {
            payload: Vec<u8>,
            priority: i32,
            pattern: JobPattern,
            timeout_ms: u64,
            required_capabilities: BTreeSet<Capability>,
        }
        option {
            idempotency_key: IdempotencyKey,
            target_agent_id: AgentId,
            target_group: String,
        }
    }
}

/// A single dispatched unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
    pub command: String,
    pub payload: Vec<u8>,
    pub priority: i32,
    pub pattern: JobPattern,
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group: Option<String>,
    #[serde(default)]
    pub required_capabilities: BTreeSet<Capability>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    /// Number of consecutive unroutable dispatch attempts (§4.5 step 2).
    #[serde(default)]
    pub unroutable_attempts: u32,
}

impl Job {
    pub fn new(id: JobId, request: JobRequest, now_ms: u64) -> Self {
        Self {
            id,
            idempotency_key: request.idempotency_key,
            command: request.command,
            payload: request.payload,
            priority: request.priority,
            pattern: request.pattern,
            timeout_ms: request.timeout_ms,
            target_agent_id: request.target_agent_id,
            target_group: request.target_group,
            required_capabilities: request.required_capabilities,
            created_at_ms: now_ms,
            assigned_at_ms: None,
            assigned_agent_id: None,
            started_at_ms: None,
            completed_at_ms: None,
            status: JobStatus::Pending,
            result: None,
            error: None,
            retry_count: 0,
            unroutable_attempts: 0,
        }
    }

    fn illegal(&self, action: &str) -> CoreError {
        CoreError::IllegalTransition { from: self.status.to_string(), action: action.into() }
    }

    /// `Pending -> Assigned`.
    pub fn assign(&mut self, agent_id: AgentId, now_ms: u64) -> CoreResult<()> {
        if self.status != JobStatus::Pending {
            return Err(self.illegal("assign"));
        }
        self.status = JobStatus::Assigned;
        self.assigned_agent_id = Some(agent_id);
        self.assigned_at_ms = Some(now_ms);
        Ok(())
    }

    /// `Assigned -> Running`. Acking an already-Running job is a no-op (§8).
    pub fn ack(&mut self, now_ms: u64) -> CoreResult<()> {
        if self.status == JobStatus::Running {
            return Ok(());
        }
        if self.status != JobStatus::Assigned {
            return Err(self.illegal("ack"));
        }
        self.status = JobStatus::Running;
        self.started_at_ms = Some(now_ms);
        Ok(())
    }

    /// `Assigned -> Pending`, ack-timeout retry. Per §9 this does not count
    /// against `maxRetries` (a separate policy axis from step/job-level retries).
    pub fn ack_timeout(&mut self) -> CoreResult<()> {
        if self.status != JobStatus::Assigned {
            return Err(self.illegal("ack_timeout"));
        }
        self.status = JobStatus::Pending;
        self.assigned_agent_id = None;
        self.assigned_at_ms = None;
        self.retry_count += 1;
        Ok(())
    }

    /// `Running -> Completed`.
    pub fn complete(&mut self, result: Vec<u8>, now_ms: u64) -> CoreResult<()> {
        if self.status != JobStatus::Running {
            return Err(self.illegal("complete"));
        }
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.completed_at_ms = Some(now_ms);
        Ok(())
    }

    /// `Running -> Failed` (or `Pending` for a reassignable retry still under
    /// `max_retries`, left to the caller via `retryable`).
    pub fn fail(&mut self, error: impl Into<String>, retryable: bool, max_retries: u32, now_ms: u64) -> CoreResult<()> {
        if self.status != JobStatus::Running {
            return Err(self.illegal("fail"));
        }
        let error = error.into();
        if retryable && self.retry_count < max_retries {
            self.status = JobStatus::Pending;
            self.assigned_agent_id = None;
            self.assigned_at_ms = None;
            self.started_at_ms = None;
            self.retry_count += 1;
            self.error = Some(error);
        } else {
            self.status = JobStatus::Failed;
            self.error = Some(error);
            self.completed_at_ms = Some(now_ms);
        }
        Ok(())
    }

    /// `Running -> TimedOut`.
    pub fn timeout_fire(&mut self, now_ms: u64) -> CoreResult<()> {
        if self.status != JobStatus::Running {
            return Err(self.illegal("timeout_fire"));
        }
        self.status = JobStatus::TimedOut;
        self.completed_at_ms = Some(now_ms);
        Ok(())
    }

    /// `{Pending, Assigned, Running} -> Cancelled`.
    pub fn cancel(&mut self, reason: impl Into<String>, now_ms: u64) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(self.illegal("cancel"));
        }
        self.status = JobStatus::Cancelled;
        self.error = Some(reason.into());
        self.completed_at_ms = Some(now_ms);
        Ok(())
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            id: JobId = JobId::new(),
            command: String = "noop",
        }
        set {
            payload: Vec<u8> = Vec::new(),
            priority: i32 = 0,
            pattern: JobPattern = JobPattern::RequestResponse,
            timeout_ms: u64 = 30_000,
            required_capabilities: BTreeSet<Capability> = BTreeSet::new(),
            created_at_ms: u64 = 0,
            status: JobStatus = JobStatus::Pending,
            retry_count: u32 = 0,
            unroutable_attempts: u32 = 0,
        }
        option {
            idempotency_key: IdempotencyKey = None,
            target_agent_id: AgentId = None,
            target_group: String = None,
            assigned_at_ms: u64 = None,
            assigned_agent_id: AgentId = None,
            started_at_ms: u64 = None,
            completed_at_ms: u64 = None,
            result: Vec<u8> = None,
            error: String = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
