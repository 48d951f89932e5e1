// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete identifier types.
//!
//! Server-assigned identifiers (agents, jobs, workflow instances, events,
//! approvals) use [`crate::define_id!`] — a random nanoid with a type prefix,
//! or an explicit value when the caller supplies one. Identifiers that are
//! always author- or caller-supplied (a workflow step id, an idempotency
//! key, a correlation id) are plain string newtypes instead: generating a
//! random value for them would make no sense.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

crate::define_id! {
    /// Identifies one remote agent across its connection lifetime.
    pub struct AgentId("agt-");
}

crate::define_id! {
    /// Identifies one live bidirectional channel to one agent.
    pub struct SessionId("ses-");
}

crate::define_id! {
    /// Identifies a single dispatched unit of work.
    pub struct JobId("job-");
}

crate::define_id! {
    /// Identifies a workflow definition (a specific version is addressed via
    /// `WorkflowDefinition::version`, not a separate id).
    pub struct WorkflowDefinitionId("wfd-");
}

crate::define_id! {
    /// Identifies one running (or completed) instantiation of a workflow.
    pub struct WorkflowInstanceId("wfi-");
}

crate::define_id! {
    /// Identifies a human-in-the-loop approval request raised by an
    /// Approval step.
    pub struct ApprovalId("apr-");
}

crate::define_id! {
    /// Identifies one appended event record.
    pub struct EventId("evt-");
}

/// A string newtype for identifiers that are always supplied by the author
/// or caller rather than generated — defining them via `define_id!` would
/// be misleading since `new()` on those types generates a random value.
macro_rules! plain_id {
    ($(#[$meta:meta])* pub struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub SmolStr);

        impl $name {
            pub fn new(s: impl Into<SmolStr>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.0.as_str()
            }
        }
    };
}

plain_id! {
    /// A workflow step's id, unique within its `WorkflowDefinition`. Always
    /// author-supplied in the workflow document, never generated.
    pub struct StepId;
}

plain_id! {
    /// Caller-supplied key that collapses duplicate job submissions within
    /// the dispatcher's idempotency TTL (§4.5).
    pub struct IdempotencyKey;
}

plain_id! {
    /// Caller-supplied key used to match a `WaitForEvent` step to the
    /// `SendEvent` that should resume it.
    pub struct CorrelationId;
}

plain_id! {
    /// Opaque tag naming a feature an agent supports, used for routing.
    pub struct Capability;
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
