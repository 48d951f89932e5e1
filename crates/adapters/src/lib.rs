// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! orbitmesh-adapters: the abstract boundary between the control plane and
//! everything §1 calls an external collaborator — the agent transport, and
//! the notification/approval/sub-workflow hooks the workflow engine calls
//! out through. Every trait here has a no-op or in-memory fake default so
//! the rest of the workspace can be built and tested without a concrete
//! transport.

pub mod approval;
pub mod notify;
pub mod subworkflow;
pub mod transport;

pub use approval::{ApprovalNotifier, ApprovalNotifyError, NoopApprovalNotifier};
pub use notify::{NoopNotificationSender, NotificationSender, NotifyError};
pub use subworkflow::{NoopSubWorkflowLauncher, SubWorkflowLaunchError, SubWorkflowLauncher, SubWorkflowResult};
pub use transport::{AgentSession, AgentToServer, AgentTransport, ServerToAgent, TransportError, TransportResult};

#[cfg(any(test, feature = "test-support"))]
pub use approval::{ApprovalNotifyCall, FakeApprovalNotifier};
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotificationSender, NotifyCall};
#[cfg(any(test, feature = "test-support"))]
pub use subworkflow::{FakeSubWorkflowLauncher, LaunchCall};
#[cfg(any(test, feature = "test-support"))]
pub use transport::{FakeAgentSession, FakeTransport};
