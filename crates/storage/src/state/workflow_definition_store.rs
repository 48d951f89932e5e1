// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process `WorkflowDefinitionStore` (§6): save, get by id and optional
//! version, list enabled, delete. Definitions aren't event-sourced — they're
//! authored documents, not an aggregate with transitions — so this store has
//! no `apply_event`; it's written to directly whenever an operator loads or
//! removes a workflow.

use crate::error::{StorageError, StorageResult};
use orbitmesh_core::{WorkflowDefinition, WorkflowDefinitionId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

pub trait WorkflowDefinitionStore: Send + Sync {
    fn save(&self, definition: WorkflowDefinition);
    fn get(&self, id: &WorkflowDefinitionId, version: Option<u32>) -> Option<WorkflowDefinition>;
    fn list_enabled(&self) -> Vec<WorkflowDefinition>;
    fn delete(&self, id: &WorkflowDefinitionId) -> StorageResult<()>;
}

#[derive(Default)]
pub struct InMemoryWorkflowDefinitionStore {
    definitions: RwLock<HashMap<WorkflowDefinitionId, BTreeMap<u32, WorkflowDefinition>>>,
}

impl InMemoryWorkflowDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowDefinitionStore for InMemoryWorkflowDefinitionStore {
    fn save(&self, definition: WorkflowDefinition) {
        self.definitions.write().entry(definition.id.clone()).or_default().insert(definition.version, definition);
    }

    fn get(&self, id: &WorkflowDefinitionId, version: Option<u32>) -> Option<WorkflowDefinition> {
        let definitions = self.definitions.read();
        let versions = definitions.get(id)?;
        match version {
            Some(v) => versions.get(&v).cloned(),
            None => versions.values().next_back().cloned(),
        }
    }

    fn list_enabled(&self) -> Vec<WorkflowDefinition> {
        self.definitions
            .read()
            .values()
            .filter_map(|versions| versions.values().next_back())
            .filter(|d| d.enabled)
            .cloned()
            .collect()
    }

    fn delete(&self, id: &WorkflowDefinitionId) -> StorageResult<()> {
        self.definitions
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound { what: "workflow_definition", id: id.to_string() })
    }
}

#[cfg(test)]
#[path = "workflow_definition_store_tests.rs"]
mod tests;
