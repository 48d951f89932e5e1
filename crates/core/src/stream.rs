// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-store stream identifiers (§6 storage contract: `Append(streamId, ...)`).
//!
//! One stream per aggregate instance, so a stream id is always derived from
//! the aggregate's own id. Structured the same way as [`crate::timer::TimerId`]:
//! a plain formatted string with a typed parse/format round-trip, not an
//! `IdBuf` (composite keys exceed its fixed capacity).

use crate::ids::{AgentId, JobId, WorkflowInstanceId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn agent(id: &AgentId) -> Self {
        StreamKind::Agent(id.clone()).to_stream_id()
    }

    pub fn job(id: &JobId) -> Self {
        StreamKind::Job(id.clone()).to_stream_id()
    }

    pub fn workflow_instance(id: &WorkflowInstanceId) -> Self {
        StreamKind::WorkflowInstance(id.clone()).to_stream_id()
    }

    pub fn kind(&self) -> Option<StreamKind> {
        StreamKind::parse(self.as_str())
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parsed representation of a stream id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamKind {
    Agent(AgentId),
    Job(JobId),
    WorkflowInstance(WorkflowInstanceId),
}

impl StreamKind {
    pub fn parse(id: &str) -> Option<StreamKind> {
        if let Some(rest) = id.strip_prefix("agent:") {
            return Some(StreamKind::Agent(AgentId::from_string(rest)));
        }
        if let Some(rest) = id.strip_prefix("job:") {
            return Some(StreamKind::Job(JobId::from_string(rest)));
        }
        if let Some(rest) = id.strip_prefix("workflow-instance:") {
            return Some(StreamKind::WorkflowInstance(WorkflowInstanceId::from_string(rest)));
        }
        None
    }

    pub fn to_stream_id(&self) -> StreamId {
        match self {
            StreamKind::Agent(id) => StreamId::new(format!("agent:{id}")),
            StreamKind::Job(id) => StreamId::new(format!("job:{id}")),
            StreamKind::WorkflowInstance(id) => StreamId::new(format!("workflow-instance:{id}")),
        }
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
