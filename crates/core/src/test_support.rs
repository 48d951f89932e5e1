// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{AgentId, Event, JobId, SessionId, WorkflowDefinitionId, WorkflowInstanceId};

/// Proptest strategies for core state machine types.
#[cfg(feature = "proptest")]
pub mod strategies {
    use crate::job::JobStatus;
    use proptest::prelude::*;

    pub fn arb_job_status() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Pending),
            Just(JobStatus::Assigned),
            Just(JobStatus::Running),
            Just(JobStatus::Completed),
            Just(JobStatus::Failed),
            Just(JobStatus::Cancelled),
            Just(JobStatus::TimedOut),
        ]
    }
}

pub fn agent_registered_event(agent_id: &str) -> Event {
    Event::AgentRegistered {
        agent_id: AgentId::from_string(agent_id),
        name: "test-agent".to_string(),
        session_id: SessionId::new(),
    }
}

pub fn agent_disconnected_event(agent_id: &str) -> Event {
    Event::AgentDisconnected { agent_id: AgentId::from_string(agent_id) }
}

pub fn job_enqueued_event(job_id: &str) -> Event {
    Event::JobEnqueued { job_id: JobId::from_string(job_id) }
}

pub fn job_assigned_event(job_id: &str, agent_id: &str) -> Event {
    Event::JobAssigned { job_id: JobId::from_string(job_id), agent_id: AgentId::from_string(agent_id) }
}

pub fn job_completed_event(job_id: &str) -> Event {
    Event::JobCompleted { job_id: JobId::from_string(job_id) }
}

pub fn workflow_instance_created_event(instance_id: &str, workflow_id: &str) -> Event {
    Event::WorkflowInstanceCreated {
        instance_id: WorkflowInstanceId::from_string(instance_id),
        workflow_id: WorkflowDefinitionId::from_string(workflow_id),
        workflow_version: 1,
    }
}

pub fn workflow_instance_completed_event(instance_id: &str) -> Event {
    Event::WorkflowInstanceCompleted { instance_id: WorkflowInstanceId::from_string(instance_id) }
}
