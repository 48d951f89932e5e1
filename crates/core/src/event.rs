// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain events (§3 `EventRecord`, §4 "every state change ... emits a
//! domain event"). Serializes with `{"type": "category:name", ...fields}`;
//! unknown type tags deserialize to [`Event::Custom`] so the event log
//! tolerates forward-incompatible readers (§9 event log vs. projections).

use crate::ids::{AgentId, ApprovalId, EventId, JobId, SessionId, StepId, WorkflowDefinitionId, WorkflowInstanceId};
use crate::stream::StreamId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- agent registry (§4.1) --
    #[serde(rename = "agent:registered")]
    AgentRegistered { agent_id: AgentId, name: String, session_id: SessionId },

    #[serde(rename = "agent:reconnected")]
    AgentReconnected { agent_id: AgentId, previous_session_id: Option<SessionId>, session_id: SessionId },

    #[serde(rename = "agent:status_changed")]
    AgentStatusChanged { agent_id: AgentId, from: String, to: String },

    #[serde(rename = "agent:heartbeat")]
    AgentHeartbeat { agent_id: AgentId, at_ms: u64 },

    #[serde(rename = "agent:disconnected")]
    AgentDisconnected { agent_id: AgentId },

    // -- job lifecycle (§4.3, §4.5) --
    #[serde(rename = "job:enqueued")]
    JobEnqueued { job_id: JobId },

    #[serde(rename = "job:assigned")]
    JobAssigned { job_id: JobId, agent_id: AgentId },

    #[serde(rename = "job:ack_received")]
    JobAckReceived { job_id: JobId },

    #[serde(rename = "job:ack_timed_out")]
    JobAckTimedOut { job_id: JobId, retry_count: u32 },

    #[serde(rename = "job:progress_reported")]
    JobProgressReported { job_id: JobId, sequence: u64 },

    #[serde(rename = "job:completed")]
    JobCompleted { job_id: JobId },

    #[serde(rename = "job:failed")]
    JobFailed { job_id: JobId, error: String, retrying: bool },

    #[serde(rename = "job:cancelled")]
    JobCancelled { job_id: JobId, reason: String },

    #[serde(rename = "job:timed_out")]
    JobTimedOut { job_id: JobId },

    // -- workflow engine (§4.9) --
    #[serde(rename = "workflow_instance:created")]
    WorkflowInstanceCreated { instance_id: WorkflowInstanceId, workflow_id: WorkflowDefinitionId, workflow_version: u32 },

    #[serde(rename = "workflow_instance:started")]
    WorkflowInstanceStarted { instance_id: WorkflowInstanceId },

    #[serde(rename = "workflow_instance:step_started")]
    StepStarted { instance_id: WorkflowInstanceId, step_id: StepId },

    #[serde(rename = "workflow_instance:step_completed")]
    StepCompleted { instance_id: WorkflowInstanceId, step_id: StepId },

    #[serde(rename = "workflow_instance:step_failed")]
    StepFailed { instance_id: WorkflowInstanceId, step_id: StepId, error: String },

    #[serde(rename = "workflow_instance:step_skipped")]
    StepSkipped { instance_id: WorkflowInstanceId, step_id: StepId },

    #[serde(rename = "workflow_instance:paused")]
    WorkflowInstancePaused { instance_id: WorkflowInstanceId, step_id: StepId },

    #[serde(rename = "workflow_instance:approval_requested")]
    ApprovalRequested { instance_id: WorkflowInstanceId, step_id: StepId, approval_id: ApprovalId, approvers: Vec<String> },

    #[serde(rename = "workflow_instance:resumed")]
    WorkflowInstanceResumed { instance_id: WorkflowInstanceId, step_id: StepId },

    #[serde(rename = "workflow_instance:completed")]
    WorkflowInstanceCompleted { instance_id: WorkflowInstanceId },

    #[serde(rename = "workflow_instance:failed")]
    WorkflowInstanceFailed { instance_id: WorkflowInstanceId, error: String },

    #[serde(rename = "workflow_instance:cancelled")]
    WorkflowInstanceCancelled { instance_id: WorkflowInstanceId, reason: String },

    #[serde(rename = "workflow_instance:compensation_started")]
    CompensationStarted { instance_id: WorkflowInstanceId },

    #[serde(rename = "workflow_instance:compensation_completed")]
    CompensationCompleted { instance_id: WorkflowInstanceId },

    /// Catch-all for unknown event types (forward compatibility).
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    /// The stream this event belongs to, when the event carries enough
    /// context to derive one (`Custom` does not).
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            Event::AgentRegistered { agent_id, .. }
            | Event::AgentReconnected { agent_id, .. }
            | Event::AgentStatusChanged { agent_id, .. }
            | Event::AgentHeartbeat { agent_id, .. }
            | Event::AgentDisconnected { agent_id } => Some(StreamId::agent(agent_id)),

            Event::JobEnqueued { job_id }
            | Event::JobAssigned { job_id, .. }
            | Event::JobAckReceived { job_id }
            | Event::JobAckTimedOut { job_id, .. }
            | Event::JobProgressReported { job_id, .. }
            | Event::JobCompleted { job_id }
            | Event::JobFailed { job_id, .. }
            | Event::JobCancelled { job_id, .. }
            | Event::JobTimedOut { job_id } => Some(StreamId::job(job_id)),

            Event::WorkflowInstanceCreated { instance_id, .. }
            | Event::WorkflowInstanceStarted { instance_id }
            | Event::StepStarted { instance_id, .. }
            | Event::StepCompleted { instance_id, .. }
            | Event::StepFailed { instance_id, .. }
            | Event::StepSkipped { instance_id, .. }
            | Event::WorkflowInstancePaused { instance_id, .. }
            | Event::ApprovalRequested { instance_id, .. }
            | Event::WorkflowInstanceResumed { instance_id, .. }
            | Event::WorkflowInstanceCompleted { instance_id }
            | Event::WorkflowInstanceFailed { instance_id, .. }
            | Event::WorkflowInstanceCancelled { instance_id, .. }
            | Event::CompensationStarted { instance_id }
            | Event::CompensationCompleted { instance_id } => Some(StreamId::workflow_instance(instance_id)),

            Event::Custom => None,
        }
    }

    /// A short, loggable summary (mirrors each variant's tag + primary id).
    pub fn log_summary(&self) -> String {
        match self {
            Event::AgentRegistered { agent_id, name, .. } => format!("agent:registered {agent_id} ({name})"),
            Event::AgentReconnected { agent_id, .. } => format!("agent:reconnected {agent_id}"),
            Event::AgentStatusChanged { agent_id, from, to } => format!("agent:status_changed {agent_id} {from}->{to}"),
            Event::AgentHeartbeat { agent_id, .. } => format!("agent:heartbeat {agent_id}"),
            Event::AgentDisconnected { agent_id } => format!("agent:disconnected {agent_id}"),
            Event::JobEnqueued { job_id } => format!("job:enqueued {job_id}"),
            Event::JobAssigned { job_id, agent_id } => format!("job:assigned {job_id} -> {agent_id}"),
            Event::JobAckReceived { job_id } => format!("job:ack_received {job_id}"),
            Event::JobAckTimedOut { job_id, .. } => format!("job:ack_timed_out {job_id}"),
            Event::JobProgressReported { job_id, sequence } => format!("job:progress {job_id} #{sequence}"),
            Event::JobCompleted { job_id } => format!("job:completed {job_id}"),
            Event::JobFailed { job_id, .. } => format!("job:failed {job_id}"),
            Event::JobCancelled { job_id, .. } => format!("job:cancelled {job_id}"),
            Event::JobTimedOut { job_id } => format!("job:timed_out {job_id}"),
            Event::WorkflowInstanceCreated { instance_id, .. } => format!("workflow_instance:created {instance_id}"),
            Event::WorkflowInstanceStarted { instance_id } => format!("workflow_instance:started {instance_id}"),
            Event::StepStarted { instance_id, step_id } => format!("step_started {instance_id}/{step_id}"),
            Event::StepCompleted { instance_id, step_id } => format!("step_completed {instance_id}/{step_id}"),
            Event::StepFailed { instance_id, step_id, .. } => format!("step_failed {instance_id}/{step_id}"),
            Event::StepSkipped { instance_id, step_id } => format!("step_skipped {instance_id}/{step_id}"),
            Event::WorkflowInstancePaused { instance_id, step_id } => format!("workflow_instance:paused {instance_id} at {step_id}"),
            Event::ApprovalRequested { instance_id, step_id, .. } => format!("approval_requested {instance_id}/{step_id}"),
            Event::WorkflowInstanceResumed { instance_id, step_id } => format!("workflow_instance:resumed {instance_id} at {step_id}"),
            Event::WorkflowInstanceCompleted { instance_id } => format!("workflow_instance:completed {instance_id}"),
            Event::WorkflowInstanceFailed { instance_id, .. } => format!("workflow_instance:failed {instance_id}"),
            Event::WorkflowInstanceCancelled { instance_id, .. } => format!("workflow_instance:cancelled {instance_id}"),
            Event::CompensationStarted { instance_id } => format!("compensation_started {instance_id}"),
            Event::CompensationCompleted { instance_id } => format!("compensation_completed {instance_id}"),
            Event::Custom => "custom".to_string(),
        }
    }
}

/// One appended, positioned record in the event log (§3, §6 `EventStore`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: EventId,
    pub stream_id: StreamId,
    pub event: Event,
    /// Monotonic per-stream version, starting at 1.
    pub version: u64,
    /// Monotonic global position across all streams.
    pub position: u64,
    pub timestamp_ms: u64,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
