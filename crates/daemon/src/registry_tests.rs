// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orbitmesh_core::{FakeClock, Job, JobRequest};
use orbitmesh_storage::{EventStore, InMemoryAgentStore, InMemoryJobStore};
use std::sync::Arc;
use tempfile::TempDir;

fn test_registry() -> (AgentRegistry<FakeClock>, Arc<InMemoryJobStore>, FakeClock, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(EventStore::open(dir.path().join("events.wal")).unwrap());
    let agents: Arc<dyn AgentStore> = Arc::new(InMemoryAgentStore::new());
    let jobs = Arc::new(InMemoryJobStore::new());
    let clock = FakeClock::new();
    let registry = AgentRegistry::new(agents, jobs.clone(), events, clock.clone(), 15_000);
    (registry, jobs, clock, dir)
}

#[test]
fn register_then_reconnect_preserves_most_recent_session() {
    let (registry, _jobs, _clock, _dir) = test_registry();
    let agent_id = AgentId::new();

    registry
        .register(agent_id.clone(), "worker-1", vec![Capability::new("shell")], vec![], None, SessionId::new())
        .unwrap();
    let first = registry.get(&agent_id).unwrap();
    assert_eq!(first.status, AgentStatus::Ready);

    let second_session = SessionId::new();
    registry.register(agent_id.clone(), "worker-1", vec![Capability::new("shell")], vec![], None, second_session.clone()).unwrap();
    let reconnected = registry.get(&agent_id).unwrap();
    assert_eq!(reconnected.session_id, Some(second_session));
}

#[test]
fn list_by_capability_excludes_non_routable_agents() {
    let (registry, _jobs, _clock, _dir) = test_registry();
    let cap = Capability::new("gpu");
    let a = AgentId::new();
    let b = AgentId::new();
    registry.register(a.clone(), "a", vec![cap.clone()], vec![], None, SessionId::new()).unwrap();
    registry.register(b.clone(), "b", vec![cap.clone()], vec![], None, SessionId::new()).unwrap();
    registry.update_status(&b, AgentStatus::Faulted).unwrap();

    let routable = registry.list_by_capability(&cap);
    assert_eq!(routable.len(), 1);
    assert_eq!(routable[0].id, a);
}

#[test]
fn sweep_disconnects_stale_agents_and_requeues_their_jobs() {
    let (registry, jobs, clock, _dir) = test_registry();
    let agent_id = AgentId::new();
    registry.register(agent_id.clone(), "worker", vec![], vec![], None, SessionId::new()).unwrap();

    let job_id = orbitmesh_core::JobId::new();
    let mut job = Job::new(job_id.clone(), JobRequest::new("do-thing"), clock.epoch_ms());
    job.status = JobStatus::Running;
    job.assigned_agent_id = Some(agent_id.clone());
    job.assigned_at_ms = Some(clock.epoch_ms());
    job.started_at_ms = Some(clock.epoch_ms());
    jobs.create(job).unwrap();

    clock.advance(std::time::Duration::from_millis(20_000));
    let disconnected = registry.sweep_heartbeats();
    assert_eq!(disconnected, 1);

    let agent = registry.get(&agent_id).unwrap();
    assert_eq!(agent.status, AgentStatus::Disconnected);
    assert!(agent.session_id.is_none());

    let requeued = jobs.get(&job_id).unwrap();
    assert_eq!(requeued.status, JobStatus::Pending);
    assert!(requeued.assigned_agent_id.is_none());
    assert_eq!(requeued.retry_count, 1);
}

#[test]
fn sweep_leaves_fresh_agents_alone() {
    let (registry, _jobs, clock, _dir) = test_registry();
    let agent_id = AgentId::new();
    registry.register(agent_id.clone(), "worker", vec![], vec![], None, SessionId::new()).unwrap();

    clock.advance(std::time::Duration::from_millis(1_000));
    assert_eq!(registry.sweep_heartbeats(), 0);
    assert_eq!(registry.get(&agent_id).unwrap().status, AgentStatus::Ready);
}
