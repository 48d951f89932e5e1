// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orbitmesh_core::{JobPattern, JobRequest};

fn job(id: JobId, priority: i32, created_at_ms: u64) -> Job {
    let request = JobRequest::new("run").priority(priority).pattern(JobPattern::FireAndForget);
    Job::new(id, request, created_at_ms)
}

#[test]
fn create_then_get_round_trips() {
    let store = InMemoryJobStore::new();
    let id = JobId::new();
    store.create(job(id.clone(), 0, 0)).unwrap();
    assert_eq!(store.get(&id).unwrap().id, id);
}

#[test]
fn create_duplicate_id_is_rejected() {
    let store = InMemoryJobStore::new();
    let id = JobId::new();
    store.create(job(id.clone(), 0, 0)).unwrap();
    let err = store.create(job(id, 0, 0)).unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists { .. }));
}

#[test]
fn update_cas_applies_a_valid_transition() {
    let store = InMemoryJobStore::new();
    let id = JobId::new();
    store.create(job(id.clone(), 0, 0)).unwrap();
    let agent_id = AgentId::new();

    let new_version = store.update_cas(&id, Some(1), &|j| j.assign(agent_id.clone(), 10)).unwrap();

    assert_eq!(new_version, 2);
    assert_eq!(store.get(&id).unwrap().status, JobStatus::Assigned);
}

#[test]
fn update_cas_with_stale_expected_version_is_a_conflict() {
    let store = InMemoryJobStore::new();
    let id = JobId::new();
    store.create(job(id.clone(), 0, 0)).unwrap();

    let err = store.update_cas(&id, Some(99), &|j| j.cancel("nope", 0)).unwrap_err();
    assert!(matches!(err, StorageError::VersionConflict { .. }));
}

#[test]
fn update_cas_rejects_illegal_domain_transitions() {
    let store = InMemoryJobStore::new();
    let id = JobId::new();
    store.create(job(id.clone(), 0, 0)).unwrap();

    let err = store.update_cas(&id, None, &|j| j.complete(Vec::new(), 0)).unwrap_err();
    assert!(matches!(err, StorageError::IllegalTransition { .. }));
    assert_eq!(store.get(&id).unwrap().status, JobStatus::Pending);
}

#[test]
fn list_pending_ordered_sorts_by_priority_then_age() {
    let store = InMemoryJobStore::new();
    let low = JobId::new();
    let high = JobId::new();
    let older_high = JobId::new();
    store.create(job(low.clone(), 1, 100)).unwrap();
    store.create(job(high.clone(), 5, 200)).unwrap();
    store.create(job(older_high.clone(), 5, 50)).unwrap();

    let ordered = store.list_pending_ordered();
    let ids: Vec<_> = ordered.iter().map(|j| j.id.clone()).collect();
    assert_eq!(ids, vec![older_high, high, low]);
}

#[test]
fn list_timed_out_finds_running_jobs_past_deadline() {
    let store = InMemoryJobStore::new();
    let id = JobId::new();
    store.create(job(id.clone(), 0, 0)).unwrap();
    store.update_cas(&id, None, &|j| j.assign(AgentId::new(), 0)).unwrap();
    store.update_cas(&id, None, &|j| j.ack(0)).unwrap();

    assert!(store.list_timed_out(29_000).is_empty());
    let timed_out = store.list_timed_out(31_000);
    assert_eq!(timed_out.len(), 1);
    assert_eq!(timed_out[0].id, id);
}

#[test]
fn count_by_status_tallies_each_bucket() {
    let store = InMemoryJobStore::new();
    store.create(job(JobId::new(), 0, 0)).unwrap();
    store.create(job(JobId::new(), 0, 0)).unwrap();

    let counts = store.count_by_status();
    assert_eq!(counts.get(&JobStatus::Pending), Some(&2));
}
