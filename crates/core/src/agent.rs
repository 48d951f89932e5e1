// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent record: what the registry tracks about one connected (or
//! previously connected) agent.

use crate::ids::{AgentId, Capability, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Created,
    Initializing,
    Ready,
    Running,
    Paused,
    Stopping,
    Stopped,
    Faulted,
    Disconnected,
}

impl AgentStatus {
    /// Agents in these statuses are eligible for routing lookups.
    pub fn is_routable(self) -> bool {
        matches!(self, AgentStatus::Ready | AgentStatus::Running | AgentStatus::Paused)
    }

    /// Whether this status implies a live session is attached.
    pub fn is_connected(self) -> bool {
        !matches!(self, AgentStatus::Disconnected | AgentStatus::Stopped | AgentStatus::Faulted)
    }
}

crate::simple_display! {
    AgentStatus {
        Created => "created",
        Initializing => "initializing",
        Ready => "ready",
        Running => "running",
        Paused => "paused",
        Stopping => "stopping",
        Stopped => "stopped",
        Faulted => "faulted",
        Disconnected => "disconnected",
    }
}

/// What the registry knows about one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub status: AgentStatus,
    /// Present iff the agent currently has a live session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub last_heartbeat_ms: u64,
    #[serde(default)]
    pub reported_state: std::collections::BTreeMap<String, String>,
}

impl AgentRecord {
    pub fn new(id: AgentId, name: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id,
            name: name.into(),
            group: None,
            capabilities: BTreeSet::new(),
            tags: BTreeSet::new(),
            status: AgentStatus::Created,
            session_id: None,
            last_heartbeat_ms: now_ms,
            reported_state: std::collections::BTreeMap::new(),
        }
    }

    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    pub fn has_all_capabilities<'a>(&self, required: impl IntoIterator<Item = &'a Capability>) -> bool {
        required.into_iter().all(|c| self.has_capability(c))
    }

    pub fn is_stale(&self, now_ms: u64, heartbeat_timeout_ms: u64) -> bool {
        self.last_heartbeat_ms + heartbeat_timeout_ms < now_ms
    }
}

crate::builder! {
    pub struct AgentRecordBuilder => AgentRecord {
        into {
            id: AgentId = AgentId::new(),
            name: String = "test-agent",
        }
        set {
            status: AgentStatus = AgentStatus::Ready,
            last_heartbeat_ms: u64 = 0,
        }
        option {
            session_id: SessionId = None,
            group: String = None,
        }
        computed {
            capabilities: BTreeSet<Capability> = BTreeSet::new(),
            tags: BTreeSet<String> = BTreeSet::new(),
            reported_state: std::collections::BTreeMap<String, String> = std::collections::BTreeMap::new(),
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
