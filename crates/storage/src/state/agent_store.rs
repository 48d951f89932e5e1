// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process `AgentStore` (§6): upsert, get, list, query by capability or
//! group, and an atomic status+heartbeat update. Guarded by a single
//! `parking_lot::RwLock` per the shared-resource policy of §5 ("one lock per
//! agent for status mutation; indices updated within the same critical
//! section") — simplified here to one lock over the whole map, which is
//! sufficient at the fleet sizes this control plane targets.

use crate::error::{StorageError, StorageResult};
use orbitmesh_core::{AgentId, AgentRecord, AgentStatus, Capability, Event};
use parking_lot::RwLock;
use std::collections::HashMap;

pub trait AgentStore: Send + Sync {
    fn upsert(&self, record: AgentRecord);
    fn get(&self, id: &AgentId) -> Option<AgentRecord>;
    fn list(&self) -> Vec<AgentRecord>;
    fn query_by_capability(&self, capability: &Capability) -> Vec<AgentRecord>;
    fn query_by_group(&self, group: &str) -> Vec<AgentRecord>;
    fn update_status_and_heartbeat(&self, id: &AgentId, status: AgentStatus, heartbeat_ms: u64) -> StorageResult<()>;
    fn remove(&self, id: &AgentId) -> Option<AgentRecord>;

    /// Best-effort projection from a replayed event. Agent events carry
    /// enough to mirror status/session/heartbeat but not capabilities or
    /// group (those are set at registration time via `upsert`), so this is
    /// only exact for a store that was also kept live via direct writes.
    fn apply_event(&self, event: &Event);
}

#[derive(Default)]
pub struct InMemoryAgentStore {
    records: RwLock<HashMap<AgentId, AgentRecord>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgentStore for InMemoryAgentStore {
    fn upsert(&self, record: AgentRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    fn get(&self, id: &AgentId) -> Option<AgentRecord> {
        self.records.read().get(id).cloned()
    }

    fn list(&self) -> Vec<AgentRecord> {
        self.records.read().values().cloned().collect()
    }

    fn query_by_capability(&self, capability: &Capability) -> Vec<AgentRecord> {
        self.records.read().values().filter(|r| r.has_capability(capability)).cloned().collect()
    }

    fn query_by_group(&self, group: &str) -> Vec<AgentRecord> {
        self.records.read().values().filter(|r| r.group.as_deref() == Some(group)).cloned().collect()
    }

    fn update_status_and_heartbeat(&self, id: &AgentId, status: AgentStatus, heartbeat_ms: u64) -> StorageResult<()> {
        let mut records = self.records.write();
        let record = records.get_mut(id).ok_or_else(|| StorageError::NotFound { what: "agent", id: id.to_string() })?;
        record.status = status;
        record.last_heartbeat_ms = heartbeat_ms;
        Ok(())
    }

    fn remove(&self, id: &AgentId) -> Option<AgentRecord> {
        self.records.write().remove(id)
    }

    fn apply_event(&self, event: &Event) {
        match event {
            Event::AgentRegistered { agent_id, name, session_id } => {
                let mut records = self.records.write();
                let record = records.entry(agent_id.clone()).or_insert_with(|| AgentRecord::new(agent_id.clone(), name.clone(), 0));
                record.name = name.clone();
                record.session_id = Some(session_id.clone());
                record.status = AgentStatus::Ready;
            }
            Event::AgentReconnected { agent_id, session_id, .. } => {
                if let Some(record) = self.records.write().get_mut(agent_id) {
                    record.session_id = Some(session_id.clone());
                    record.status = AgentStatus::Ready;
                }
            }
            Event::AgentStatusChanged { agent_id, to, .. } => {
                if let (Some(record), Some(status)) = (self.records.write().get_mut(agent_id), parse_status(to)) {
                    record.status = status;
                }
            }
            Event::AgentHeartbeat { agent_id, at_ms } => {
                if let Some(record) = self.records.write().get_mut(agent_id) {
                    record.last_heartbeat_ms = *at_ms;
                }
            }
            Event::AgentDisconnected { agent_id } => {
                if let Some(record) = self.records.write().get_mut(agent_id) {
                    record.status = AgentStatus::Disconnected;
                    record.session_id = None;
                }
            }
            _ => {}
        }
    }
}

fn parse_status(s: &str) -> Option<AgentStatus> {
    match s {
        "created" => Some(AgentStatus::Created),
        "initializing" => Some(AgentStatus::Initializing),
        "ready" => Some(AgentStatus::Ready),
        "running" => Some(AgentStatus::Running),
        "paused" => Some(AgentStatus::Paused),
        "stopping" => Some(AgentStatus::Stopping),
        "stopped" => Some(AgentStatus::Stopped),
        "faulted" => Some(AgentStatus::Faulted),
        "disconnected" => Some(AgentStatus::Disconnected),
        _ => None,
    }
}

#[cfg(test)]
#[path = "agent_store_tests.rs"]
mod tests;
