// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher (§4.5): bounded priority queue, worker pool, idempotency
//! cache, ack/job-timeout enforcement, and cancellation. Owns the
//! `JobStore` the same way [`crate::registry::AgentRegistry`] owns the
//! `AgentStore` — the store is the record of truth, this is the policy
//! that moves jobs through it.

use crate::config::ResilienceConfig;
use crate::metrics::Metrics;
use crate::registry::AgentRegistry;
use crate::resilience::CircuitBreaker;
use crate::router::{Router, RoutingRequest};
use orbitmesh_adapters::transport::{AgentTransport, ServerToAgent};
use orbitmesh_core::{AgentId, Clock, Event, IdempotencyKey, Job, JobId, JobRequest, JobStatus};
use orbitmesh_storage::{EventStore, JobStore, StorageError};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no such job {0}")]
    NotFound(JobId),

    #[error("dispatch queue is full")]
    Backpressure,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A terminal-or-in-flight idempotency entry (§4.5 "Idempotency").
#[derive(Clone)]
struct IdempotencyRecord {
    job_id: JobId,
    recorded_at_ms: u64,
}

/// One entry on the bounded pending-job heap. Holding the semaphore permit
/// here (rather than bookkeeping queue depth separately) means popping an
/// item and dropping it — successfully dispatched or not — always frees
/// exactly the capacity it took.
struct QueueItem {
    priority: i32,
    created_at_ms: u64,
    job_id: JobId,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.created_at_ms == other.created_at_ms
    }
}
impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    /// Higher priority first; among equal priorities, older (smaller
    /// `created_at_ms`) first — `BinaryHeap` is a max-heap so both
    /// comparisons are flipped to prefer "smaller created_at" as "greater".
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority).then_with(|| other.created_at_ms.cmp(&self.created_at_ms))
    }
}

/// Live counters not worth persisting (§4.5 "queue fullness and the count
/// of ack-pending assignments are exposed as metrics").
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatcherStats {
    pub queue_depth: usize,
    pub ack_pending: usize,
}

pub struct Dispatcher<C: Clock> {
    jobs: Arc<dyn JobStore>,
    events: Arc<EventStore>,
    registry: Arc<AgentRegistry<C>>,
    router: Router,
    transport: Arc<dyn AgentTransport>,
    clock: C,
    metrics: Arc<Metrics>,

    queue: Mutex<BinaryHeap<QueueItem>>,
    permits: Arc<Semaphore>,
    ack_timeouts: Mutex<HashMap<JobId, CancellationToken>>,
    idempotency: Mutex<HashMap<IdempotencyKey, IdempotencyRecord>>,
    circuit_breakers: Mutex<HashMap<AgentId, Arc<CircuitBreaker<C>>>>,
    resilience_config: ResilienceConfig,

    ack_timeout_ms: u64,
    max_unroutable_attempts: u32,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
    block_on_full_queue: bool,
    idempotency_ttl_ms: u64,
}

impl<C: Clock + Clone + Send + Sync + 'static> Dispatcher<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        events: Arc<EventStore>,
        registry: Arc<AgentRegistry<C>>,
        router: Router,
        transport: Arc<dyn AgentTransport>,
        clock: C,
        metrics: Arc<Metrics>,
        resilience_config: ResilienceConfig,
        queue_capacity: usize,
        ack_timeout_ms: u64,
        max_unroutable_attempts: u32,
        backoff_base_ms: u64,
        backoff_max_ms: u64,
        block_on_full_queue: bool,
        idempotency_ttl_ms: u64,
    ) -> Self {
        Self {
            jobs,
            events,
            registry,
            router,
            transport,
            clock,
            metrics,
            queue: Mutex::new(BinaryHeap::new()),
            permits: Arc::new(Semaphore::new(queue_capacity)),
            ack_timeouts: Mutex::new(HashMap::new()),
            idempotency: Mutex::new(HashMap::new()),
            circuit_breakers: Mutex::new(HashMap::new()),
            resilience_config,
            ack_timeout_ms,
            max_unroutable_attempts,
            backoff_base_ms,
            backoff_max_ms,
            block_on_full_queue,
            idempotency_ttl_ms,
        }
    }

    /// `Enqueue(JobRequest) -> Job` (§4.5). Consults the idempotency cache
    /// first: a terminal or in-flight job with the same key is returned
    /// as-is rather than creating a duplicate.
    #[instrument(skip(self, request))]
    pub async fn enqueue(&self, request: JobRequest) -> Result<Job, DispatchError> {
        if let Some(key) = request.idempotency_key.clone() {
            if let Some(job_id) = self.lookup_idempotency(&key) {
                if let Some(existing) = self.jobs.get(&job_id) {
                    return Ok(existing);
                }
            }
        }

        let now_ms = self.clock.epoch_ms();
        let job = Job::new(JobId::new(), request.clone(), now_ms);
        self.jobs.create(job.clone())?;
        self.append_event(Event::JobEnqueued { job_id: job.id.clone() }, now_ms);
        if let Some(key) = request.idempotency_key {
            self.idempotency.lock().insert(key, IdempotencyRecord { job_id: job.id.clone(), recorded_at_ms: now_ms });
        }

        self.push_pending(job.id.clone(), job.priority, job.created_at_ms).await?;
        self.metrics.jobs_enqueued.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(job)
    }

    fn lookup_idempotency(&self, key: &IdempotencyKey) -> Option<JobId> {
        self.idempotency.lock().get(key).map(|r| r.job_id.clone())
    }

    /// Drop stale idempotency entries (§4.5 "TTL").
    pub fn sweep_idempotency(&self) {
        let now_ms = self.clock.epoch_ms();
        let ttl = self.idempotency_ttl_ms;
        self.idempotency.lock().retain(|_, record| now_ms.saturating_sub(record.recorded_at_ms) < ttl);
    }

    /// Acquire queue capacity and push onto the priority heap (§4.5
    /// "Backpressure"). Blocks if `block_on_full_queue`, else fails fast.
    async fn push_pending(&self, job_id: JobId, priority: i32, created_at_ms: u64) -> Result<(), DispatchError> {
        let permit = if self.block_on_full_queue {
            // The semaphore is never closed, so `Err` here is unreachable in
            // practice; treat it the same as backpressure rather than panicking.
            self.permits.clone().acquire_owned().await.map_err(|_| DispatchError::Backpressure)?
        } else {
            self.permits.clone().try_acquire_owned().map_err(|_| DispatchError::Backpressure)?
        };
        self.queue.lock().push(QueueItem { priority, created_at_ms, job_id, _permit: permit });
        self.metrics.queue_depth.store(self.queue_depth() as i64, AtomicOrdering::Relaxed);
        Ok(())
    }

    fn pop_pending(&self) -> Option<QueueItem> {
        let item = self.queue.lock().pop();
        self.metrics.queue_depth.store(self.queue_depth() as i64, AtomicOrdering::Relaxed);
        item
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats { queue_depth: self.queue_depth(), ack_pending: self.ack_timeouts.lock().len() }
    }

    /// Spawn `worker_count` worker tasks pulling from the shared queue.
    pub fn spawn_workers(self: &Arc<Self>, worker_count: usize, cancel: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        (0..worker_count)
            .map(|_| {
                let dispatcher = self.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { dispatcher.worker_loop(cancel).await })
            })
            .collect()
    }

    async fn worker_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let Some(item) = self.pop_pending() else {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_millis(25)) => continue,
                }
            };
            self.process(item.job_id).await;
        }
    }

    /// One pull-dispatch cycle for a single job (§4.5 steps 1-4).
    async fn process(self: &Arc<Self>, job_id: JobId) {
        let Some(job) = self.jobs.get(&job_id) else { return };
        if job.status != JobStatus::Pending {
            return;
        }

        let request = RoutingRequest::new().required_capabilities(job.required_capabilities.clone());
        let request = match &job.target_group {
            Some(group) => request.target_group(group.clone()),
            None => request,
        };
        let request = match &job.target_agent_id {
            Some(agent_id) => request.preferred_agent_id(agent_id.clone()),
            None => request,
        };

        let agents = self.registry.list_routable();
        let mut job_counts: HashMap<AgentId, usize> = HashMap::new();
        for agent in &agents {
            let running = self.jobs.list_by_agent(&agent.id).into_iter().filter(|j| matches!(j.status, JobStatus::Assigned | JobStatus::Running)).count();
            job_counts.insert(agent.id.clone(), running);
        }

        match self.router.route(&agents, &job_counts, &request) {
            Some(agent_id) => self.dispatch_to(job_id, agent_id).await,
            None => self.handle_unroutable(job_id).await,
        }
    }

    async fn dispatch_to(self: &Arc<Self>, job_id: JobId, agent_id: AgentId) {
        let now_ms = self.clock.epoch_ms();
        let assign_result = self.jobs.update_cas(&job_id, None, &|job| job.assign(agent_id.clone(), now_ms));
        let Ok(_) = assign_result else {
            // Concurrently cancelled or otherwise no longer Pending: drop (§4.5 step 3).
            return;
        };
        self.append_event(Event::JobAssigned { job_id: job_id.clone(), agent_id: agent_id.clone() }, now_ms);

        let Some(agent) = self.registry.get(&agent_id) else {
            self.revert_to_pending(&job_id).await;
            return;
        };
        let Some(session_id) = agent.session_id else {
            self.revert_to_pending(&job_id).await;
            return;
        };
        let Some(session) = self.transport.session(&session_id).await else {
            self.revert_to_pending(&job_id).await;
            return;
        };
        let Some(job) = self.jobs.get(&job_id) else { return };

        let breaker = self.circuit_breaker_for(&agent_id);
        if !breaker.allow() {
            warn!(%job_id, %agent_id, "circuit open for agent, reverting to pending");
            self.revert_to_pending(&job_id).await;
            return;
        }

        let send_result = session
            .send(ServerToAgent::ExecuteJob { job_id: job_id.clone(), command: job.command.clone(), payload: job.payload.clone(), timeout_ms: job.timeout_ms })
            .await;
        if send_result.is_err() {
            breaker.record_failure();
            warn!(%job_id, %agent_id, "failed to send job to agent, reverting to pending");
            self.revert_to_pending(&job_id).await;
            return;
        }
        breaker.record_success();

        self.arm_ack_timeout(job_id);
    }

    /// Per-agent circuit breaker guarding dispatch sends (§13): a flapping
    /// agent trips its own breaker without penalizing sends to healthy ones.
    fn circuit_breaker_for(&self, agent_id: &AgentId) -> Arc<CircuitBreaker<C>> {
        self.circuit_breakers
            .lock()
            .entry(agent_id.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(&self.resilience_config, self.clock.clone())))
            .clone()
    }

    /// Put an Assigned job back to Pending and re-enqueue it (used when an
    /// assignment can't actually be delivered, not the ack-timeout path).
    async fn revert_to_pending(self: &Arc<Self>, job_id: &JobId) {
        let result = self.jobs.update_cas(job_id, None, &|job| {
            job.status = JobStatus::Pending;
            job.assigned_agent_id = None;
            job.assigned_at_ms = None;
            Ok(())
        });
        if result.is_ok() {
            if let Some(job) = self.jobs.get(job_id) {
                let _ = self.push_pending(job.id, job.priority, job.created_at_ms).await;
            }
        }
    }

    fn arm_ack_timeout(self: &Arc<Self>, job_id: JobId) {
        let cancel = CancellationToken::new();
        self.ack_timeouts.lock().insert(job_id.clone(), cancel.clone());
        self.metrics.ack_pending.store(self.ack_timeouts.lock().len() as i64, AtomicOrdering::Relaxed);

        let dispatcher = self.clone();
        let timeout = Duration::from_millis(self.ack_timeout_ms);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => dispatcher.on_ack_timeout(job_id).await,
            }
        });
    }

    /// `AckJob` inbound: `Assigned -> Running` (§4.5 step 5).
    async fn on_ack(self: &Arc<Self>, job_id: JobId) {
        if let Some(cancel) = self.ack_timeouts.lock().remove(&job_id) {
            cancel.cancel();
        }
        self.metrics.ack_pending.store(self.ack_timeouts.lock().len() as i64, AtomicOrdering::Relaxed);
        let now_ms = self.clock.epoch_ms();
        if self.jobs.update_cas(&job_id, None, &|job| job.ack(now_ms)).is_ok() {
            self.append_event(Event::JobAckReceived { job_id }, now_ms);
        }
    }

    /// Ack-timeout fired: `Assigned -> Pending`, re-enqueue (§4.5 step 5,
    /// §9 "does not count against maxRetries").
    async fn on_ack_timeout(self: Arc<Self>, job_id: JobId) {
        self.ack_timeouts.lock().remove(&job_id);
        self.metrics.ack_pending.store(self.ack_timeouts.lock().len() as i64, AtomicOrdering::Relaxed);

        let result = self.jobs.update_cas(&job_id, None, &|job| job.ack_timeout());
        let Ok(_) = result else { return };
        let Some(job) = self.jobs.get(&job_id) else { return };
        let now_ms = self.clock.epoch_ms();
        self.append_event(Event::JobAckTimedOut { job_id: job_id.clone(), retry_count: job.retry_count }, now_ms);
        warn!(%job_id, "ack timed out, re-enqueueing");
        let _ = self.push_pending(job.id, job.priority, job.created_at_ms).await;
    }

    /// Spawn the periodic job-timeout sweep (§4.5 step 6). Grounded on
    /// [`JobStore::list_timed_out`] the same way [`AgentRegistry`]'s
    /// heartbeat sweep is grounded on [`orbitmesh_core::AgentRecord::is_stale`]
    /// — a recurring pass rather than one timer per running job.
    pub fn spawn_job_timeout_sweep(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => dispatcher.sweep_job_timeouts().await,
                }
            }
        })
    }

    /// Spawn the periodic idempotency-cache TTL sweep (§4.5 "Idempotency",
    /// §10.6).
    pub fn spawn_idempotency_sweep(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => dispatcher.sweep_idempotency(),
                }
            }
        })
    }

    async fn sweep_job_timeouts(self: &Arc<Self>) {
        let now_ms = self.clock.epoch_ms();
        for job in self.jobs.list_timed_out(now_ms) {
            let job_id = job.id.clone();
            if self.jobs.update_cas(&job_id, None, &|j| j.timeout_fire(now_ms)).is_err() {
                continue;
            }
            self.append_event(Event::JobTimedOut { job_id: job_id.clone() }, now_ms);
            self.metrics.jobs_timed_out.fetch_add(1, AtomicOrdering::Relaxed);
            if let Some(agent_id) = job.assigned_agent_id.clone() {
                self.send_cancel(&agent_id, &job_id, "job timed out").await;
            }
            info!(%job_id, "job timed out");
        }
    }

    /// Unroutable dispatch attempt (§4.5 step 2): requeue with exponential
    /// backoff bounded by `backoff_max_ms`, failing the job outright once
    /// `max_unroutable_attempts` is exceeded.
    async fn handle_unroutable(self: &Arc<Self>, job_id: JobId) {
        let result = self.jobs.update_cas(&job_id, None, &|job| {
            job.unroutable_attempts += 1;
            Ok(())
        });
        let Ok(_) = result else { return };
        let Some(job) = self.jobs.get(&job_id) else { return };

        if job.unroutable_attempts > self.max_unroutable_attempts {
            let now_ms = self.clock.epoch_ms();
            let fail_result = self.jobs.update_cas(&job_id, None, &|j| j.fail("no eligible agent", false, 0, now_ms));
            if fail_result.is_ok() {
                self.append_event(Event::JobFailed { job_id: job_id.clone(), error: "no eligible agent".to_string(), retrying: false }, now_ms);
                self.metrics.jobs_failed.fetch_add(1, AtomicOrdering::Relaxed);
                warn!(%job_id, "job failed: exhausted unroutable attempts");
            }
            return;
        }

        let backoff = self.backoff_for(job.unroutable_attempts);
        let dispatcher = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let _ = dispatcher.push_pending(job.id, job.priority, job.created_at_ms).await;
        });
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let ms = self.backoff_base_ms.saturating_mul(1u64 << attempt.min(20)).min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }

    /// `Cancel(jobId, reason)` (§4.5 "Cancellation"). Signals the agent if
    /// the job is already dispatched, then transitions to Cancelled.
    #[instrument(skip(self))]
    pub async fn cancel(self: &Arc<Self>, job_id: &JobId, reason: impl Into<String> + Clone) -> Result<(), DispatchError> {
        let job = self.jobs.get(job_id).ok_or_else(|| DispatchError::NotFound(job_id.clone()))?;
        if let Some(cancel) = self.ack_timeouts.lock().remove(job_id) {
            cancel.cancel();
        }
        if let Some(agent_id) = job.assigned_agent_id.clone() {
            self.send_cancel(&agent_id, job_id, reason.clone().into()).await;
        }

        let now_ms = self.clock.epoch_ms();
        let reason_str = reason.into();
        self.jobs.update_cas(job_id, None, &|j| j.cancel(reason_str.clone(), now_ms))?;
        self.append_event(Event::JobCancelled { job_id: job_id.clone(), reason: reason_str }, now_ms);
        self.metrics.jobs_cancelled.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(())
    }

    async fn send_cancel(&self, agent_id: &AgentId, job_id: &JobId, reason: impl Into<String>) {
        let Some(agent) = self.registry.get(agent_id) else { return };
        let Some(session_id) = agent.session_id else { return };
        let Some(session) = self.transport.session(&session_id).await else { return };
        let _ = session.send(ServerToAgent::CancelJob { job_id: job_id.clone(), reason: reason.into() }).await;
    }

    /// `ReportResult` inbound: `Running -> Completed` (only success is
    /// reported over the wire; failure is a business-logic concern of the
    /// engine's step executors, not the transport).
    pub async fn on_result(self: &Arc<Self>, job_id: JobId, result: Vec<u8>) {
        let now_ms = self.clock.epoch_ms();
        if self.jobs.update_cas(&job_id, None, &|job| job.complete(result.clone(), now_ms)).is_ok() {
            self.append_event(Event::JobCompleted { job_id: job_id.clone() }, now_ms);
            self.metrics.jobs_completed.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    /// Dispatch-relevant inbound RPCs the session layer hands up (`AckJob`,
    /// `ReportResult`); progress/stream items go to
    /// [`crate::stream_bus::StreamBus`] instead.
    pub async fn handle_inbound_ack(self: &Arc<Self>, job_id: JobId) {
        self.on_ack(job_id).await;
    }

    fn append_event(&self, event: Event, now_ms: u64) {
        let Some(stream_id) = event.stream_id() else { return };
        if let Err(e) = self.events.append(&stream_id, vec![event], None, now_ms) {
            warn!(%stream_id, error = %e, "failed to append event");
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
