// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ControlPlane`: composes the Agent Registry, Router, Dispatcher,
//! Progress & Stream Bus, Workflow Engine, and Trigger Service into one
//! running process, plus the background sweeps each of them needs (§10.6
//! "Graceful shutdown", mirroring the teacher's `lifecycle/startup.rs`
//! generalized away from its process-specific concerns — pidfiles, a Unix
//! socket, tmux). One `ControlPlane` per daemon process.

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::metrics::Metrics;
use crate::registry::{spawn_heartbeat_sweep, AgentRegistry};
use crate::router::Router;
use crate::stream_bus::StreamBus;
use orbitmesh_adapters::{
    AgentSession, AgentToServer, AgentTransport, NoopApprovalNotifier, NoopNotificationSender, NoopSubWorkflowLauncher,
};
use orbitmesh_core::{AgentId, Clock, SessionId};
use orbitmesh_engine::{spawn_schedule_sweep, Engine, ExecutorDeps, TriggerService};
use orbitmesh_storage::{
    AgentStore, EventStore, InMemoryAgentStore, InMemoryJobStore, InMemoryWorkflowDefinitionStore, InMemoryWorkflowInstanceStore,
    JobStore, StorageError, WorkflowDefinitionStore, WorkflowInstanceStore,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("failed to open event store: {0}")]
    Storage(#[from] StorageError),
}

/// Everything a running OrbitMesh control plane needs, wired together.
/// Generic over the clock so it can be driven by a [`FakeClock`](orbitmesh_core::FakeClock)
/// in tests the same way every other service in this crate is.
pub struct ControlPlane<C: Clock> {
    pub config: Config,
    pub clock: C,
    pub metrics: Arc<Metrics>,
    pub registry: Arc<AgentRegistry<C>>,
    pub dispatcher: Arc<Dispatcher<C>>,
    pub engine: Arc<Engine>,
    pub triggers: Arc<TriggerService<C>>,
    pub stream_bus: Arc<StreamBus>,
    pub transport: Arc<dyn AgentTransport>,
    pub job_store: Arc<dyn JobStore>,
    pub workflow_definitions: Arc<dyn WorkflowDefinitionStore>,

    cancel: CancellationToken,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl<C: Clock + Clone + Send + Sync + 'static> ControlPlane<C> {
    /// Build every service named in §4 against fresh in-memory projections
    /// and a WAL-backed event log at `wal_path`. Crash recovery (replaying
    /// the WAL into the job/workflow-instance projections on restart) is not
    /// wired up yet — see `DESIGN.md`.
    pub fn new(config: Config, clock: C, transport: Arc<dyn AgentTransport>, wal_path: &Path) -> Result<Self, ControlPlaneError> {
        let events = Arc::new(EventStore::open(wal_path)?);
        let metrics = Arc::new(Metrics::new());

        let agent_store: Arc<dyn AgentStore> = Arc::new(InMemoryAgentStore::new());
        let job_store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let definitions: Arc<dyn WorkflowDefinitionStore> = Arc::new(InMemoryWorkflowDefinitionStore::new());
        let instances: Arc<dyn WorkflowInstanceStore> = Arc::new(InMemoryWorkflowInstanceStore::new());

        let registry = Arc::new(AgentRegistry::new(agent_store, job_store.clone(), events.clone(), clock.clone(), config.heartbeat.timeout_ms));
        let router = Router::new(config.dispatcher.routing_policy);
        let dispatcher = Arc::new(Dispatcher::new(
            job_store.clone(),
            events.clone(),
            registry.clone(),
            router,
            transport.clone(),
            clock.clone(),
            metrics.clone(),
            config.resilience.clone(),
            config.dispatcher.queue_capacity,
            config.dispatcher.ack_timeout_ms,
            config.dispatcher.max_unroutable_attempts,
            config.dispatcher.backoff_base_ms,
            config.dispatcher.backoff_max_ms,
            config.dispatcher.block_on_full_queue,
            config.idempotency.ttl_ms,
        ));

        let executor_deps = ExecutorDeps {
            job_store: job_store.clone(),
            workflow_instance_store: instances.clone(),
            notifier: Arc::new(NoopNotificationSender),
            approvals: Arc::new(NoopApprovalNotifier),
            sub_workflows: Arc::new(NoopSubWorkflowLauncher),
            poll_interval: Duration::from_millis(100),
        };
        let engine = Arc::new(Engine::new(definitions.clone(), instances, events, executor_deps));
        let triggers = Arc::new(TriggerService::new(engine.clone(), clock.clone()));
        let stream_bus = Arc::new(StreamBus::new(config.stream.progress_history_cap, config.stream.stream_buffer_cap, config.stream.stream_retention_ms));

        Ok(Self {
            config,
            clock,
            metrics,
            registry,
            dispatcher,
            engine,
            triggers,
            stream_bus,
            transport,
            job_store,
            workflow_definitions: definitions,
            cancel: CancellationToken::new(),
            tasks: AsyncMutex::new(Vec::new()),
        })
    }

    /// Spawn every background sweep (§4.1, §4.5, §4.5 idempotency, §12) in
    /// dependency order.
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        tasks.extend(self.dispatcher.spawn_workers(self.config.dispatcher.worker_count, self.cancel.clone()));
        tasks.push(self.dispatcher.spawn_job_timeout_sweep(Duration::from_millis(self.config.dispatcher.job_timeout_sweep_interval_ms), self.cancel.clone()));
        tasks.push(self.dispatcher.spawn_idempotency_sweep(Duration::from_millis(self.config.idempotency.sweep_interval_ms), self.cancel.clone()));
        tasks.push(spawn_heartbeat_sweep(self.registry.clone(), self.heartbeat_sweep_interval(), self.cancel.clone()));
        tasks.push(spawn_schedule_sweep(self.triggers.clone(), self.schedule_sweep_interval(), self.cancel.clone()));
        info!(worker_count = self.config.dispatcher.worker_count, "control plane started");
    }

    /// At most half of `heartbeat.timeout_ms`, so a stale agent is caught
    /// within one extra sweep period of its actual timeout (§4.1).
    fn heartbeat_sweep_interval(&self) -> Duration {
        Duration::from_millis((self.config.heartbeat.timeout_ms / 2).max(self.config.heartbeat.interval_ms).max(1))
    }

    fn schedule_sweep_interval(&self) -> Duration {
        Duration::from_millis(1_000)
    }

    /// Stop accepting new work and wait for every spawned sweep/worker to
    /// observe cancellation. In-flight dispatch/engine calls already running
    /// are allowed to finish; this only stops the periodic background tasks.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        info!("control plane shut down");
    }

    /// Pump one agent session's inbound RPCs (§4.2) until it closes,
    /// dispatching each to whichever service owns that concern. The first
    /// message is expected to be `Register`; anything else arriving first is
    /// logged and ignored, since no agent identity is known yet.
    pub async fn handle_session(&self, session: Arc<dyn AgentSession>) {
        let mut agent_id: Option<AgentId> = None;
        while let Some(message) = session.recv().await {
            match message {
                AgentToServer::Register { agent_id: id, name, capabilities, group } => {
                    if let Err(error) = self.registry.register(id.clone(), name, capabilities, vec![], group, session.id().clone()) {
                        warn!(%error, "failed to register agent");
                        continue;
                    }
                    self.metrics.sessions_connected.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    agent_id = Some(id);
                }
                AgentToServer::Heartbeat { agent_id: id, .. } => {
                    let _ = self.registry.update_heartbeat(&id);
                }
                AgentToServer::AckJob { job_id } => {
                    self.dispatcher.handle_inbound_ack(job_id).await;
                }
                AgentToServer::ReportProgress { job_id, sequence, message } => {
                    self.stream_bus.report_progress(job_id, sequence, message, self.clock.epoch_ms());
                }
                AgentToServer::ReportStreamItem { job_id, sequence, data, is_end_of_stream } => {
                    if let Err(error) = self.stream_bus.publish_stream_item(job_id, sequence, data, is_end_of_stream, self.clock.epoch_ms()) {
                        warn!(%error, "rejected stream item");
                    }
                }
                AgentToServer::ReportResult { job_id, result } => {
                    self.dispatcher.on_result(job_id, result).await;
                }
                AgentToServer::ReportState { .. } => {}
            }
        }
        self.on_session_closed(session.id(), agent_id.as_ref());
    }

    fn on_session_closed(&self, session_id: &SessionId, agent_id: Option<&AgentId>) {
        let Some(agent_id) = agent_id else { return };
        if self.registry.unregister(agent_id).is_ok() {
            self.metrics.sessions_connected.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
            info!(%session_id, %agent_id, "session closed, agent disconnected");
        }
    }
}

#[cfg(test)]
#[path = "control_plane_tests.rs"]
mod tests;
