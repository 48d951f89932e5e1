// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process `WorkflowInstanceStore` (§6): create, get, update via CAS,
//! queries for the scheduling loop (running instances) and for event
//! correlation (instances with a step parked on a given event type and,
//! optionally, a correlation key).

use crate::error::{StorageError, StorageResult};
use crate::state::types::Versioned;
use orbitmesh_core::{CoreError, WorkflowInstance, WorkflowInstanceId, WorkflowInstanceStatus};
use parking_lot::RwLock;
use std::collections::HashMap;

pub trait WorkflowInstanceStore: Send + Sync {
    fn create(&self, instance: WorkflowInstance) -> StorageResult<()>;
    fn get(&self, id: &WorkflowInstanceId) -> Option<WorkflowInstance>;
    fn version_of(&self, id: &WorkflowInstanceId) -> Option<u64>;

    /// Apply `f` to the current instance if `expected_version` matches (when given),
    /// persisting the result and returning the new version.
    fn update_cas(
        &self,
        id: &WorkflowInstanceId,
        expected_version: Option<u64>,
        f: &dyn Fn(&mut WorkflowInstance) -> Result<(), CoreError>,
    ) -> StorageResult<u64>;

    fn list_by_status(&self, status: WorkflowInstanceStatus) -> Vec<WorkflowInstance>;

    /// Instances currently Running or Compensating — the scheduling loop's working set.
    fn list_running(&self) -> Vec<WorkflowInstance>;

    /// Paused instances whose waiting step matches `event_type` and, if given,
    /// `correlation_key` — used to resolve an incoming external event to a
    /// specific waiting step (§4.9 correlation rule).
    fn list_waiting_for_event(&self, event_type: &str, correlation_key: Option<&str>) -> Vec<WorkflowInstance>;

    fn list_page(&self, offset: usize, limit: usize) -> Vec<WorkflowInstance>;
}

#[derive(Default)]
pub struct InMemoryWorkflowInstanceStore {
    instances: RwLock<HashMap<WorkflowInstanceId, Versioned<WorkflowInstance>>>,
}

impl InMemoryWorkflowInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowInstanceStore for InMemoryWorkflowInstanceStore {
    fn create(&self, instance: WorkflowInstance) -> StorageResult<()> {
        let mut instances = self.instances.write();
        if instances.contains_key(&instance.id) {
            return Err(StorageError::AlreadyExists { what: "workflow_instance", id: instance.id.to_string() });
        }
        instances.insert(instance.id.clone(), Versioned::new(instance));
        Ok(())
    }

    fn get(&self, id: &WorkflowInstanceId) -> Option<WorkflowInstance> {
        self.instances.read().get(id).map(|v| v.value.clone())
    }

    fn version_of(&self, id: &WorkflowInstanceId) -> Option<u64> {
        self.instances.read().get(id).map(|v| v.version)
    }

    fn update_cas(
        &self,
        id: &WorkflowInstanceId,
        expected_version: Option<u64>,
        f: &dyn Fn(&mut WorkflowInstance) -> Result<(), CoreError>,
    ) -> StorageResult<u64> {
        let mut instances = self.instances.write();
        let entry = instances
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound { what: "workflow_instance", id: id.to_string() })?;

        if let Some(expected) = expected_version {
            if expected != entry.version {
                return Err(StorageError::VersionConflict {
                    what: "workflow_instance",
                    id: id.to_string(),
                    expected,
                    actual: entry.version,
                });
            }
        }

        let mut candidate = entry.value.clone();
        f(&mut candidate)
            .map_err(|source| StorageError::IllegalTransition { what: "workflow_instance", id: id.to_string(), source })?;
        entry.bump(candidate);
        Ok(entry.version)
    }

    fn list_by_status(&self, status: WorkflowInstanceStatus) -> Vec<WorkflowInstance> {
        self.instances.read().values().map(|v| &v.value).filter(|i| i.status == status).cloned().collect()
    }

    fn list_running(&self) -> Vec<WorkflowInstance> {
        self.instances
            .read()
            .values()
            .map(|v| &v.value)
            .filter(|i| matches!(i.status, WorkflowInstanceStatus::Running | WorkflowInstanceStatus::Compensating))
            .cloned()
            .collect()
    }

    fn list_waiting_for_event(&self, event_type: &str, correlation_key: Option<&str>) -> Vec<WorkflowInstance> {
        self.instances
            .read()
            .values()
            .map(|v| &v.value)
            .filter(|i| i.status == WorkflowInstanceStatus::Paused)
            .filter(|i| {
                i.waiting_step().is_some_and(|step| {
                    step.waiting_event_type.as_deref() == Some(event_type)
                        && match correlation_key {
                            Some(key) => step.waiting_correlation_key.as_deref() == Some(key),
                            None => true,
                        }
                })
            })
            .cloned()
            .collect()
    }

    fn list_page(&self, offset: usize, limit: usize) -> Vec<WorkflowInstance> {
        let mut all: Vec<WorkflowInstance> = self.instances.read().values().map(|v| v.value.clone()).collect();
        all.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
        all.into_iter().skip(offset).take(limit).collect()
    }
}

#[cfg(test)]
#[path = "workflow_instance_store_tests.rs"]
mod tests;
