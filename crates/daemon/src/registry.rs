// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent Registry service (§4.1): register/unregister, status/heartbeat
//! updates, capability/group lookups, and the periodic heartbeat-timeout
//! sweep. Wraps [`AgentStore`] the same way [`crate::dispatcher::Dispatcher`]
//! wraps [`orbitmesh_storage::JobStore`] — the store owns the data, this
//! owns the policy (idempotent register, most-recent-session-wins,
//! heartbeat sweep, job requeue on disconnect).

use orbitmesh_core::{AgentId, AgentRecord, AgentStatus, Capability, Clock, Event, ErrorKind, JobStatus, SessionId};
use orbitmesh_storage::{AgentStore, EventStore, JobStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no such agent {0}")]
    NotFound(AgentId),

    #[error(transparent)]
    Storage(#[from] orbitmesh_storage::StorageError),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::Storage(e) => e.kind(),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

pub struct AgentRegistry<C: Clock> {
    store: Arc<dyn AgentStore>,
    jobs: Arc<dyn JobStore>,
    events: Arc<EventStore>,
    clock: C,
    heartbeat_timeout_ms: u64,
}

impl<C: Clock> AgentRegistry<C> {
    pub fn new(store: Arc<dyn AgentStore>, jobs: Arc<dyn JobStore>, events: Arc<EventStore>, clock: C, heartbeat_timeout_ms: u64) -> Self {
        Self { store, jobs, events, clock, heartbeat_timeout_ms }
    }

    /// Register (or reconnect) an agent under `session_id`. Idempotent: a
    /// second registration for the same `id` with a different session wins
    /// over the previous one ("most-recent wins", §4.1).
    #[instrument(skip(self, capabilities, tags))]
    pub fn register(
        &self,
        id: AgentId,
        name: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
        tags: impl IntoIterator<Item = String>,
        group: Option<String>,
        session_id: SessionId,
    ) -> RegistryResult<()> {
        let now_ms = self.clock.epoch_ms();
        let previous = self.store.get(&id);
        let event = match &previous {
            Some(existing) if existing.session_id.is_some() => {
                Event::AgentReconnected { agent_id: id.clone(), previous_session_id: existing.session_id.clone(), session_id: session_id.clone() }
            }
            _ => Event::AgentRegistered { agent_id: id.clone(), name: name.into(), session_id: session_id.clone() },
        };

        let mut record = previous.unwrap_or_else(|| AgentRecord::new(id.clone(), "", now_ms));
        if let Event::AgentRegistered { name, .. } = &event {
            record.name = name.clone();
        }
        record.capabilities = capabilities.into_iter().collect();
        record.tags = tags.into_iter().collect();
        record.group = group;
        record.status = AgentStatus::Ready;
        record.session_id = Some(session_id);
        record.last_heartbeat_ms = now_ms;
        self.store.upsert(record);
        self.append_event(event, now_ms);
        info!(agent_id = %id, "agent registered");
        Ok(())
    }

    pub fn unregister(&self, id: &AgentId) -> RegistryResult<()> {
        let now_ms = self.clock.epoch_ms();
        let mut record = self.store.get(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        record.status = AgentStatus::Disconnected;
        record.session_id = None;
        record.last_heartbeat_ms = now_ms;
        self.store.upsert(record);
        self.append_event(Event::AgentDisconnected { agent_id: id.clone() }, now_ms);
        Ok(())
    }

    pub fn update_status(&self, id: &AgentId, status: AgentStatus) -> RegistryResult<()> {
        let now_ms = self.clock.epoch_ms();
        let from = self.store.get(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?.status;
        self.store.update_status_and_heartbeat(id, status, now_ms)?;
        self.append_event(Event::AgentStatusChanged { agent_id: id.clone(), from: from.to_string(), to: status.to_string() }, now_ms);
        Ok(())
    }

    pub fn update_heartbeat(&self, id: &AgentId) -> RegistryResult<()> {
        let now_ms = self.clock.epoch_ms();
        let record = self.store.get(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        self.store.update_status_and_heartbeat(id, record.status, now_ms)?;
        self.append_event(Event::AgentHeartbeat { agent_id: id.clone(), at_ms: now_ms }, now_ms);
        Ok(())
    }

    pub fn get(&self, id: &AgentId) -> Option<AgentRecord> {
        self.store.get(id)
    }

    /// All agents, including Disconnected/Stopping/Faulted (§4.1 "unless the
    /// caller explicitly asks for all").
    pub fn list_all(&self) -> Vec<AgentRecord> {
        self.store.list()
    }

    /// Agents eligible for routing (`AgentStatus::is_routable`).
    pub fn list_routable(&self) -> Vec<AgentRecord> {
        self.store.list().into_iter().filter(|a| a.status.is_routable()).collect()
    }

    pub fn list_by_capability(&self, capability: &Capability) -> Vec<AgentRecord> {
        self.store.query_by_capability(capability).into_iter().filter(|a| a.status.is_routable()).collect()
    }

    pub fn list_by_group(&self, group: &str) -> Vec<AgentRecord> {
        self.store.query_by_group(group).into_iter().filter(|a| a.status.is_routable()).collect()
    }

    /// One pass of the heartbeat-timeout monitor (§4.1): find agents whose
    /// heartbeat is stale, mark them Disconnected, and requeue any
    /// non-terminal job still assigned to them.
    #[instrument(skip(self))]
    pub fn sweep_heartbeats(&self) -> usize {
        let now_ms = self.clock.epoch_ms();
        let mut disconnected = 0;
        for agent in self.store.list() {
            if !agent.status.is_connected() || !agent.is_stale(now_ms, self.heartbeat_timeout_ms) {
                continue;
            }
            let mut disconnected_record = agent.clone();
            disconnected_record.status = AgentStatus::Disconnected;
            disconnected_record.session_id = None;
            self.store.upsert(disconnected_record);
            self.append_event(Event::AgentDisconnected { agent_id: agent.id.clone() }, now_ms);
            warn!(agent_id = %agent.id, "agent heartbeat timed out, marking disconnected");
            self.requeue_jobs_for(&agent.id, now_ms);
            disconnected += 1;
        }
        disconnected
    }

    fn requeue_jobs_for(&self, agent_id: &AgentId, now_ms: u64) {
        for job in self.jobs.list_by_agent(agent_id) {
            if job.status != JobStatus::Assigned && job.status != JobStatus::Running {
                continue;
            }
            let job_id = job.id.clone();
            let result = self.jobs.update_cas(&job_id, None, &|job| {
                job.status = JobStatus::Pending;
                job.assigned_agent_id = None;
                job.assigned_at_ms = None;
                job.started_at_ms = None;
                job.retry_count += 1;
                Ok(())
            });
            if result.is_ok() {
                self.append_event(Event::JobFailed { job_id: job_id.clone(), error: "agent disconnected".to_string(), retrying: true }, now_ms);
                info!(%job_id, %agent_id, "requeued job after agent disconnect");
            }
        }
    }

    /// Append an event to whichever stream it belongs to (agent or job,
    /// per [`Event::stream_id`]) — this service raises both agent-lifecycle
    /// events and the `JobFailed` it emits when a disconnect requeues a job.
    fn append_event(&self, event: Event, now_ms: u64) {
        let Some(stream_id) = event.stream_id() else { return };
        if let Err(e) = self.events.append(&stream_id, vec![event], None, now_ms) {
            warn!(%stream_id, error = %e, "failed to append event");
        }
    }
}

/// Spawn the periodic heartbeat sweep as a background task. Interval is at
/// most half of `heartbeat_timeout_ms` so a stale agent is caught within one
/// extra sweep period of its actual timeout (§4.1, §5 "bounded at O(1) timer
/// count").
pub fn spawn_heartbeat_sweep<C: Clock>(
    registry: Arc<AgentRegistry<C>>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    registry.sweep_heartbeats();
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
