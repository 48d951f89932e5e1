// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects describe side effects the imperative shell must perform. Domain
//! logic (job transitions, step executors, the scheduling loop) returns
//! `Vec<Effect>` instead of calling out to the transport, timers, or
//! notification collaborators directly, so it stays pure and testable.

use crate::event::Event;
use crate::ids::{AgentId, JobId, SessionId, StepId, WorkflowDefinitionId, WorkflowInstanceId};
use crate::timer::TimerId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Emit an event into the system event bus.
    Emit { event: Event },

    /// Deliver a job to an agent over its session (§4.5 step 4).
    SendJobToAgent { agent_id: AgentId, job_id: JobId, command: String, payload: Vec<u8> },

    /// Ask an agent to cancel a job it is running (§4.5 Cancellation, §4.9 Cancellation).
    CancelJobOnAgent { agent_id: AgentId, job_id: JobId },

    /// Tell the previous session for a reconnecting agent to disconnect
    /// (§4.1 "most-recent wins").
    DisconnectSession { session_id: SessionId },

    /// Arm a timer (ack-timeout, job-timeout, heartbeat sweep, ...).
    SetTimer {
        id: TimerId,
        #[serde(with = "duration_serde")]
        duration: Duration,
    },

    /// Cancel a previously armed timer.
    CancelTimer { id: TimerId },

    /// Send a notification via the `NotificationSender` collaborator (§6).
    Notify {
        channel: String,
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        message: String,
    },

    /// Notify approvers via the `ApprovalNotifier` collaborator (§4.8 Approval).
    NotifyApprovers {
        instance_id: WorkflowInstanceId,
        step_id: StepId,
        approvers: Vec<String>,
        message: String,
    },

    /// Launch a child workflow instance via `SubWorkflowLauncher` (§4.8 SubWorkflow).
    LaunchSubWorkflow {
        workflow_id: WorkflowDefinitionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<u32>,
        input: serde_json::Value,
        parent_instance_id: WorkflowInstanceId,
        parent_step_id: StepId,
        wait_for_completion: bool,
    },
}

impl Effect {
    /// Effect name for log spans (e.g. "set_timer", "send_job_to_agent").
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Emit { .. } => "emit",
            Effect::SendJobToAgent { .. } => "send_job_to_agent",
            Effect::CancelJobOnAgent { .. } => "cancel_job_on_agent",
            Effect::DisconnectSession { .. } => "disconnect_session",
            Effect::SetTimer { .. } => "set_timer",
            Effect::CancelTimer { .. } => "cancel_timer",
            Effect::Notify { .. } => "notify",
            Effect::NotifyApprovers { .. } => "notify_approvers",
            Effect::LaunchSubWorkflow { .. } => "launch_sub_workflow",
        }
    }

    /// Key-value pairs for structured logging.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::Emit { event } => vec![("event", event.log_summary())],
            Effect::SendJobToAgent { agent_id, job_id, .. } => {
                vec![("agent_id", agent_id.to_string()), ("job_id", job_id.to_string())]
            }
            Effect::CancelJobOnAgent { agent_id, job_id } => {
                vec![("agent_id", agent_id.to_string()), ("job_id", job_id.to_string())]
            }
            Effect::DisconnectSession { session_id } => vec![("session_id", session_id.to_string())],
            Effect::SetTimer { id, duration } => {
                vec![("timer_id", id.to_string()), ("duration_ms", duration.as_millis().to_string())]
            }
            Effect::CancelTimer { id } => vec![("timer_id", id.to_string())],
            Effect::Notify { channel, target, .. } => {
                vec![("channel", channel.clone()), ("target", target.clone())]
            }
            Effect::NotifyApprovers { instance_id, step_id, .. } => {
                vec![("instance_id", instance_id.to_string()), ("step_id", step_id.to_string())]
            }
            Effect::LaunchSubWorkflow { workflow_id, parent_instance_id, .. } => vec![
                ("workflow_id", workflow_id.to_string()),
                ("parent_instance_id", parent_instance_id.to_string()),
            ],
        }
    }

    /// Whether to log both "started" and "completed", vs. just "executed",
    /// for frequent low-value effects.
    pub fn verbose(&self) -> bool {
        match self {
            Effect::Emit { .. } | Effect::SetTimer { .. } | Effect::CancelTimer { .. } => false,
            _ => true,
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        duration.as_millis().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[path = "effect_tests.rs"]
mod tests;
