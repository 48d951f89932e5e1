// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orbitmesh_core::{test_support, AgentId, SessionId};

fn agent(id: &AgentId, group: Option<&str>, caps: &[&str]) -> AgentRecord {
    let mut record = AgentRecord::new(id.clone(), "agent", 0);
    record.group = group.map(|g| g.to_string());
    record.capabilities = caps.iter().map(|c| Capability::new(*c)).collect();
    record.status = AgentStatus::Ready;
    record
}

#[test]
fn upsert_then_get_round_trips() {
    let store = InMemoryAgentStore::new();
    let id = AgentId::new();
    store.upsert(agent(&id, None, &[]));
    assert_eq!(store.get(&id).unwrap().id, id);
}

#[test]
fn query_by_capability_filters_correctly() {
    let store = InMemoryAgentStore::new();
    let gpu = AgentId::new();
    let cpu = AgentId::new();
    store.upsert(agent(&gpu, None, &["gpu"]));
    store.upsert(agent(&cpu, None, &["cpu"]));

    let found = store.query_by_capability(&Capability::new("gpu"));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, gpu);
}

#[test]
fn query_by_group_filters_correctly() {
    let store = InMemoryAgentStore::new();
    let a = AgentId::new();
    let b = AgentId::new();
    store.upsert(agent(&a, Some("workers"), &[]));
    store.upsert(agent(&b, Some("other"), &[]));

    let found = store.query_by_group("workers");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, a);
}

#[test]
fn update_status_and_heartbeat_mutates_in_place() {
    let store = InMemoryAgentStore::new();
    let id = AgentId::new();
    store.upsert(agent(&id, None, &[]));

    store.update_status_and_heartbeat(&id, AgentStatus::Paused, 500).unwrap();

    let record = store.get(&id).unwrap();
    assert_eq!(record.status, AgentStatus::Paused);
    assert_eq!(record.last_heartbeat_ms, 500);
}

#[test]
fn update_status_on_unknown_agent_is_not_found() {
    let store = InMemoryAgentStore::new();
    let err = store.update_status_and_heartbeat(&AgentId::new(), AgentStatus::Ready, 0).unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[test]
fn apply_event_registered_then_disconnected() {
    let store = InMemoryAgentStore::new();
    let id = AgentId::new();

    store.apply_event(&test_support::agent_registered_event(id.as_str()));
    let record = store.get(&id).unwrap();
    assert_eq!(record.status, AgentStatus::Ready);
    assert!(record.session_id.is_some());

    store.apply_event(&test_support::agent_disconnected_event(id.as_str()));
    let record = store.get(&id).unwrap();
    assert_eq!(record.status, AgentStatus::Disconnected);
    assert!(record.session_id.is_none());
}

#[test]
fn apply_event_heartbeat_updates_timestamp() {
    let store = InMemoryAgentStore::new();
    let id = AgentId::new();
    store.apply_event(&test_support::agent_registered_event(id.as_str()));

    store.apply_event(&Event::AgentHeartbeat { agent_id: id.clone(), at_ms: 42 });

    assert_eq!(store.get(&id).unwrap().last_heartbeat_ms, 42);
}

#[test]
fn apply_event_is_idempotent() {
    let store = InMemoryAgentStore::new();
    let id = AgentId::new();
    let event = test_support::agent_registered_event(id.as_str());

    store.apply_event(&event);
    store.apply_event(&event);

    assert_eq!(store.list().len(), 1);
}
