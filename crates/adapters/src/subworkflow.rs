// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SubWorkflowLauncher` (§6 collaborator interfaces): how the SubWorkflow
//! step executor starts a child workflow instance. Kept as a seam rather
//! than a direct call into the engine so the engine crate doesn't need a
//! circular dependency on itself through the executor.

use async_trait::async_trait;
use orbitmesh_core::{WorkflowDefinitionId, WorkflowInstanceId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubWorkflowLaunchError {
    #[error("no such workflow definition {0}")]
    NoSuchDefinition(WorkflowDefinitionId),

    #[error("sub-workflow launch failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SubWorkflowResult {
    pub child_instance_id: WorkflowInstanceId,
    /// Present only when `wait_for_completion` was set and the child reached
    /// a terminal state before returning.
    pub output: Option<serde_json::Value>,
}

#[async_trait]
pub trait SubWorkflowLauncher: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn launch(
        &self,
        workflow_id: &WorkflowDefinitionId,
        version: Option<u32>,
        input: serde_json::Value,
        parent_instance_id: &WorkflowInstanceId,
        parent_step_id: &orbitmesh_core::StepId,
        wait_for_completion: bool,
    ) -> Result<SubWorkflowResult, SubWorkflowLaunchError>;
}

/// No-op launcher: the default per §6. Always reports a failure since a
/// workflow that actually contains a SubWorkflow step needs a real
/// collaborator wired in by the daemon.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSubWorkflowLauncher;

#[async_trait]
impl SubWorkflowLauncher for NoopSubWorkflowLauncher {
    async fn launch(
        &self,
        workflow_id: &WorkflowDefinitionId,
        _version: Option<u32>,
        _input: serde_json::Value,
        _parent_instance_id: &WorkflowInstanceId,
        _parent_step_id: &orbitmesh_core::StepId,
        _wait_for_completion: bool,
    ) -> Result<SubWorkflowResult, SubWorkflowLaunchError> {
        Err(SubWorkflowLaunchError::NoSuchDefinition(workflow_id.clone()))
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{SubWorkflowLaunchError, SubWorkflowLauncher, SubWorkflowResult};
    use async_trait::async_trait;
    use orbitmesh_core::{StepId, WorkflowDefinitionId, WorkflowInstanceId};
    use parking_lot::Mutex;

    #[derive(Debug, Clone)]
    pub struct LaunchCall {
        pub workflow_id: WorkflowDefinitionId,
        pub version: Option<u32>,
        pub input: serde_json::Value,
        pub parent_instance_id: WorkflowInstanceId,
        pub parent_step_id: StepId,
        pub wait_for_completion: bool,
    }

    /// Fake launcher: always succeeds, recording calls and handing back a
    /// fresh child instance id. Set `output` to simulate a completed child
    /// when `wait_for_completion` was requested.
    #[derive(Default)]
    pub struct FakeSubWorkflowLauncher {
        calls: Mutex<Vec<LaunchCall>>,
        pub output: Mutex<Option<serde_json::Value>>,
    }

    impl FakeSubWorkflowLauncher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<LaunchCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl SubWorkflowLauncher for FakeSubWorkflowLauncher {
        async fn launch(
            &self,
            workflow_id: &WorkflowDefinitionId,
            version: Option<u32>,
            input: serde_json::Value,
            parent_instance_id: &WorkflowInstanceId,
            parent_step_id: &StepId,
            wait_for_completion: bool,
        ) -> Result<SubWorkflowResult, SubWorkflowLaunchError> {
            self.calls.lock().push(LaunchCall {
                workflow_id: workflow_id.clone(),
                version,
                input,
                parent_instance_id: parent_instance_id.clone(),
                parent_step_id: parent_step_id.clone(),
                wait_for_completion,
            });
            let output = if wait_for_completion { self.output.lock().clone() } else { None };
            Ok(SubWorkflowResult { child_instance_id: WorkflowInstanceId::new(), output })
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSubWorkflowLauncher, LaunchCall};

#[cfg(test)]
#[path = "subworkflow_tests.rs"]
mod tests;
