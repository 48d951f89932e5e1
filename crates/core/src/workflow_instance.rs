// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime state of one workflow execution (§3, §4.9).

use crate::error::{CoreError, CoreResult};
use crate::ids::{CorrelationId, JobId, StepId, WorkflowDefinitionId, WorkflowInstanceId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowInstanceStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Compensating,
}

impl WorkflowInstanceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowInstanceStatus::Completed
                | WorkflowInstanceStatus::Failed
                | WorkflowInstanceStatus::Cancelled
        )
    }
}

crate::simple_display! {
    WorkflowInstanceStatus {
        Pending => "pending",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        Compensating => "compensating",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepInstanceStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    WaitingForEvent,
    WaitingForApproval,
}

impl StepInstanceStatus {
    /// Whether a dependent step may treat this as "satisfied" (§4.9 eligibility rule).
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, StepInstanceStatus::Completed | StepInstanceStatus::Skipped)
    }

    pub fn is_waiting(self) -> bool {
        matches!(self, StepInstanceStatus::WaitingForEvent | StepInstanceStatus::WaitingForApproval)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepInstanceStatus::Completed | StepInstanceStatus::Failed | StepInstanceStatus::Skipped
        )
    }
}

crate::simple_display! {
    StepInstanceStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Skipped => "skipped",
        WaitingForEvent => "waiting_for_event",
        WaitingForApproval => "waiting_for_approval",
    }
}

/// Runtime state of one step within one [`WorkflowInstance`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInstance {
    pub step_id: StepId,
    pub status: StepInstanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_workflow_instance_id: Option<WorkflowInstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub retry_count: u32,
    /// Populated while `WaitingForEvent`: the event type being awaited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_correlation_key: Option<String>,
}

impl StepInstance {
    pub fn pending(step_id: StepId) -> Self {
        Self {
            step_id,
            status: StepInstanceStatus::Pending,
            started_at_ms: None,
            completed_at_ms: None,
            output: None,
            error: None,
            job_id: None,
            sub_workflow_instance_id: None,
            branches: None,
            retry_count: 0,
            waiting_event_type: None,
            waiting_correlation_key: None,
        }
    }
}

/// Runtime state of one workflow execution (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowInstanceId,
    pub workflow_id: WorkflowDefinitionId,
    pub workflow_version: u32,
    pub status: WorkflowInstanceStatus,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Keyed by step id; `IndexMap` preserves insertion (topological) order
    /// for deterministic iteration during the scheduling loop and compensation.
    pub step_instances: IndexMap<StepId, StepInstance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_instance_id: Option<WorkflowInstanceId>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
}

impl WorkflowInstance {
    pub fn new(
        id: WorkflowInstanceId,
        workflow_id: WorkflowDefinitionId,
        workflow_version: u32,
        input: serde_json::Value,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            workflow_id,
            workflow_version,
            status: WorkflowInstanceStatus::Pending,
            variables: BTreeMap::new(),
            input,
            output: None,
            error: None,
            step_instances: IndexMap::new(),
            correlation_id: None,
            parent_instance_id: None,
            created_at_ms: now_ms,
            started_at_ms: None,
            completed_at_ms: None,
        }
    }

    fn illegal(&self, action: &str) -> CoreError {
        CoreError::IllegalTransition { from: self.status.to_string(), action: action.into() }
    }

    pub fn start(&mut self, now_ms: u64) -> CoreResult<()> {
        if self.status != WorkflowInstanceStatus::Pending {
            return Err(self.illegal("start"));
        }
        self.status = WorkflowInstanceStatus::Running;
        self.started_at_ms = Some(now_ms);
        Ok(())
    }

    /// The single step currently waiting, if the instance is Paused (§3 invariant:
    /// exactly one step is in a waiting state while Paused).
    pub fn waiting_step(&self) -> Option<&StepInstance> {
        self.step_instances.values().find(|s| s.status.is_waiting())
    }

    pub fn pause(&mut self) -> CoreResult<()> {
        if self.status != WorkflowInstanceStatus::Running {
            return Err(self.illegal("pause"));
        }
        if self.waiting_step().is_none() {
            return Err(CoreError::Validation(
                "cannot pause a workflow instance with no waiting step".into(),
            ));
        }
        self.status = WorkflowInstanceStatus::Paused;
        Ok(())
    }

    pub fn resume_running(&mut self) -> CoreResult<()> {
        if self.status != WorkflowInstanceStatus::Paused {
            return Err(self.illegal("resume"));
        }
        self.status = WorkflowInstanceStatus::Running;
        Ok(())
    }

    pub fn complete(&mut self, output: serde_json::Value, now_ms: u64) -> CoreResult<()> {
        if self.status != WorkflowInstanceStatus::Running {
            return Err(self.illegal("complete"));
        }
        self.status = WorkflowInstanceStatus::Completed;
        self.output = Some(output);
        self.completed_at_ms = Some(now_ms);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, now_ms: u64) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(self.illegal("fail"));
        }
        self.status = WorkflowInstanceStatus::Failed;
        self.error = Some(error.into());
        self.completed_at_ms = Some(now_ms);
        Ok(())
    }

    pub fn start_compensating(&mut self) -> CoreResult<()> {
        if self.status != WorkflowInstanceStatus::Running && self.status != WorkflowInstanceStatus::Failed {
            return Err(self.illegal("start_compensating"));
        }
        self.status = WorkflowInstanceStatus::Compensating;
        Ok(())
    }

    pub fn cancel(&mut self, reason: impl Into<String>, now_ms: u64) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(self.illegal("cancel"));
        }
        self.status = WorkflowInstanceStatus::Cancelled;
        self.error = Some(reason.into());
        self.completed_at_ms = Some(now_ms);
        Ok(())
    }

    /// Completed when every step instance is Completed or Skipped (§4.9).
    pub fn all_steps_resolved(&self) -> bool {
        self.step_instances.values().all(|s| s.status.satisfies_dependency())
    }
}

#[cfg(test)]
#[path = "workflow_instance_tests.rs"]
mod tests;
