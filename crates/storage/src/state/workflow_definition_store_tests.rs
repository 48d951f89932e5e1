// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orbitmesh_core::WorkflowDefinitionId;

fn def(id: &WorkflowDefinitionId, version: u32, enabled: bool) -> WorkflowDefinition {
    let mut d = WorkflowDefinition::new(id.clone(), version, "wf");
    d.enabled = enabled;
    d
}

#[test]
fn save_then_get_latest_version_by_default() {
    let store = InMemoryWorkflowDefinitionStore::new();
    let id = WorkflowDefinitionId::new();
    store.save(def(&id, 1, true));
    store.save(def(&id, 2, true));

    let found = store.get(&id, None).unwrap();
    assert_eq!(found.version, 2);
}

#[test]
fn get_specific_version() {
    let store = InMemoryWorkflowDefinitionStore::new();
    let id = WorkflowDefinitionId::new();
    store.save(def(&id, 1, true));
    store.save(def(&id, 2, true));

    let found = store.get(&id, Some(1)).unwrap();
    assert_eq!(found.version, 1);
}

#[test]
fn list_enabled_only_returns_enabled_latest_versions() {
    let store = InMemoryWorkflowDefinitionStore::new();
    let enabled_id = WorkflowDefinitionId::new();
    let disabled_id = WorkflowDefinitionId::new();
    store.save(def(&enabled_id, 1, true));
    store.save(def(&disabled_id, 1, false));

    let enabled = store.list_enabled();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].id, enabled_id);
}

#[test]
fn delete_removes_all_versions() {
    let store = InMemoryWorkflowDefinitionStore::new();
    let id = WorkflowDefinitionId::new();
    store.save(def(&id, 1, true));

    store.delete(&id).unwrap();

    assert!(store.get(&id, None).is_none());
}

#[test]
fn delete_unknown_id_is_not_found() {
    let store = InMemoryWorkflowDefinitionStore::new();
    let err = store.delete(&WorkflowDefinitionId::new()).unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}
