// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ApprovalNotifier` (§6 collaborator interfaces): how the Approval step
//! executor reaches human approvers. The engine owns waiting/timeout/
//! resumption; this trait only covers "tell the approvers there's
//! something to decide."

use async_trait::async_trait;
use orbitmesh_core::{ApprovalId, StepId, WorkflowInstanceId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApprovalNotifyError {
    #[error("approval notification failed: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    async fn notify_approvers(
        &self,
        instance_id: &WorkflowInstanceId,
        step_id: &StepId,
        approval_id: &ApprovalId,
        approvers: &[String],
        message: &str,
    ) -> Result<(), ApprovalNotifyError>;
}

/// No-op notifier: the default per §6. The Approval step still waits and
/// times out correctly; nobody is actually told to look.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopApprovalNotifier;

#[async_trait]
impl ApprovalNotifier for NoopApprovalNotifier {
    async fn notify_approvers(
        &self,
        instance_id: &WorkflowInstanceId,
        step_id: &StepId,
        approval_id: &ApprovalId,
        approvers: &[String],
        _message: &str,
    ) -> Result<(), ApprovalNotifyError> {
        tracing::debug!(%instance_id, %step_id, %approval_id, ?approvers, "noop approval notifier: dropping notification");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{ApprovalNotifier, ApprovalNotifyError};
    use async_trait::async_trait;
    use orbitmesh_core::{ApprovalId, StepId, WorkflowInstanceId};
    use parking_lot::Mutex;

    #[derive(Debug, Clone)]
    pub struct ApprovalNotifyCall {
        pub instance_id: WorkflowInstanceId,
        pub step_id: StepId,
        pub approval_id: ApprovalId,
        pub approvers: Vec<String>,
        pub message: String,
    }

    #[derive(Default)]
    pub struct FakeApprovalNotifier {
        calls: Mutex<Vec<ApprovalNotifyCall>>,
    }

    impl FakeApprovalNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<ApprovalNotifyCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl ApprovalNotifier for FakeApprovalNotifier {
        async fn notify_approvers(
            &self,
            instance_id: &WorkflowInstanceId,
            step_id: &StepId,
            approval_id: &ApprovalId,
            approvers: &[String],
            message: &str,
        ) -> Result<(), ApprovalNotifyError> {
            self.calls.lock().push(ApprovalNotifyCall {
                instance_id: instance_id.clone(),
                step_id: step_id.clone(),
                approval_id: approval_id.clone(),
                approvers: approvers.to_vec(),
                message: message.to_string(),
            });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{ApprovalNotifyCall, FakeApprovalNotifier};

#[cfg(test)]
#[path = "approval_tests.rs"]
mod tests;
