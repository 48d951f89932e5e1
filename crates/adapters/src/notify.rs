// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `NotificationSender` (§6 collaborator interfaces): the Notify step
//! executor's only way to reach the outside world. Default is a no-op, as
//! the spec requires — a real sender (webhook, email, Slack) is plugged in
//! by the daemon binary.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification send failed: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// `channel` names the transport (webhook/email/slack/...), `target` is
    /// transport-specific (a URL, an address, a channel name).
    async fn send(&self, channel: &str, target: &str, message: &str, subject: Option<&str>) -> Result<(), NotifyError>;
}

/// No-op sender: the default per §6.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotificationSender;

#[async_trait]
impl NotificationSender for NoopNotificationSender {
    async fn send(&self, channel: &str, target: &str, _message: &str, _subject: Option<&str>) -> Result<(), NotifyError> {
        tracing::debug!(channel, target, "noop notification sender: dropping message");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{NotificationSender, NotifyError};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct NotifyCall {
        pub channel: String,
        pub target: String,
        pub message: String,
        pub subject: Option<String>,
    }

    #[derive(Default)]
    pub struct FakeNotificationSender {
        calls: Mutex<Vec<NotifyCall>>,
    }

    impl FakeNotificationSender {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<NotifyCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl NotificationSender for FakeNotificationSender {
        async fn send(&self, channel: &str, target: &str, message: &str, subject: Option<&str>) -> Result<(), NotifyError> {
            self.calls.lock().push(NotifyCall {
                channel: channel.to_string(),
                target: target.to_string(),
                message: message.to_string(),
                subject: subject.map(str::to_string),
            });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotificationSender, NotifyCall};

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
