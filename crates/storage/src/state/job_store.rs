// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process `JobStore` (§6): create, get, update via CAS, queries by
//! status/agent, priority-ordered pending list, timed-out list, and counts.
//!
//! `update_cas` takes a closure rather than a replacement value so the
//! dispatcher can run one of [`orbitmesh_core::Job`]'s state-machine methods
//! (`assign`, `ack`, `fail`, ...) against the current value and have the
//! version check and the domain validation happen together, instead of a
//! read-modify-write race between them.

use crate::error::{StorageError, StorageResult};
use crate::state::types::Versioned;
use orbitmesh_core::{AgentId, CoreError, Job, JobId, JobStatus};
use parking_lot::RwLock;
use std::collections::HashMap;

pub trait JobStore: Send + Sync {
    fn create(&self, job: Job) -> StorageResult<()>;
    fn get(&self, id: &JobId) -> Option<Job>;
    fn version_of(&self, id: &JobId) -> Option<u64>;

    /// Apply `f` to the current job if `expected_version` matches (when given),
    /// persisting the result and returning the new version.
    fn update_cas(
        &self,
        id: &JobId,
        expected_version: Option<u64>,
        f: &dyn Fn(&mut Job) -> Result<(), CoreError>,
    ) -> StorageResult<u64>;

    fn list_by_status(&self, status: JobStatus) -> Vec<Job>;
    fn list_by_agent(&self, agent_id: &AgentId) -> Vec<Job>;
    fn count_by_status(&self) -> HashMap<JobStatus, usize>;

    /// Pending jobs ordered by (priority desc, created_at asc) — dispatch order.
    fn list_pending_ordered(&self) -> Vec<Job>;

    /// Jobs whose running deadline (`started_at_ms + timeout_ms`) has passed `now_ms`.
    fn list_timed_out(&self, now_ms: u64) -> Vec<Job>;

    fn list_page(&self, offset: usize, limit: usize) -> Vec<Job>;
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Versioned<Job>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, job: Job) -> StorageResult<()> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(StorageError::AlreadyExists { what: "job", id: job.id.to_string() });
        }
        jobs.insert(job.id.clone(), Versioned::new(job));
        Ok(())
    }

    fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().get(id).map(|v| v.value.clone())
    }

    fn version_of(&self, id: &JobId) -> Option<u64> {
        self.jobs.read().get(id).map(|v| v.version)
    }

    fn update_cas(
        &self,
        id: &JobId,
        expected_version: Option<u64>,
        f: &dyn Fn(&mut Job) -> Result<(), CoreError>,
    ) -> StorageResult<u64> {
        let mut jobs = self.jobs.write();
        let entry = jobs.get_mut(id).ok_or_else(|| StorageError::NotFound { what: "job", id: id.to_string() })?;

        if let Some(expected) = expected_version {
            if expected != entry.version {
                return Err(StorageError::VersionConflict {
                    what: "job",
                    id: id.to_string(),
                    expected,
                    actual: entry.version,
                });
            }
        }

        let mut candidate = entry.value.clone();
        f(&mut candidate).map_err(|source| StorageError::IllegalTransition { what: "job", id: id.to_string(), source })?;
        entry.bump(candidate);
        Ok(entry.version)
    }

    fn list_by_status(&self, status: JobStatus) -> Vec<Job> {
        self.jobs.read().values().map(|v| &v.value).filter(|j| j.status == status).cloned().collect()
    }

    fn list_by_agent(&self, agent_id: &AgentId) -> Vec<Job> {
        self.jobs
            .read()
            .values()
            .map(|v| &v.value)
            .filter(|j| j.assigned_agent_id.as_ref() == Some(agent_id))
            .cloned()
            .collect()
    }

    fn count_by_status(&self) -> HashMap<JobStatus, usize> {
        let mut counts = HashMap::new();
        for v in self.jobs.read().values() {
            *counts.entry(v.value.status).or_insert(0) += 1;
        }
        counts
    }

    fn list_pending_ordered(&self) -> Vec<Job> {
        let mut pending: Vec<Job> =
            self.jobs.read().values().map(|v| &v.value).filter(|j| j.status == JobStatus::Pending).cloned().collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at_ms.cmp(&b.created_at_ms)));
        pending
    }

    fn list_timed_out(&self, now_ms: u64) -> Vec<Job> {
        self.jobs
            .read()
            .values()
            .map(|v| &v.value)
            .filter(|j| {
                j.status == JobStatus::Running
                    && j.started_at_ms.map(|started| started + j.timeout_ms <= now_ms).unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn list_page(&self, offset: usize, limit: usize) -> Vec<Job> {
        let mut all: Vec<Job> = self.jobs.read().values().map(|v| v.value.clone()).collect();
        all.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
        all.into_iter().skip(offset).take(limit).collect()
    }
}

#[cfg(test)]
#[path = "job_store_tests.rs"]
mod tests;
