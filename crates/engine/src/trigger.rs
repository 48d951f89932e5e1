// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger Service (§12): the three ways a workflow instance comes into
//! being. Manual and schedule triggers both fan out through
//! [`Engine::create_instance`]/[`Engine::start`]; event triggers are the
//! engine's own `SendEvent` entry point, exposed here unchanged so callers
//! have one seam for all three.

use crate::engine::Engine;
use crate::error::EngineResult;
use orbitmesh_core::{Clock, WorkflowDefinitionId, WorkflowInstanceId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A registered fixed-interval schedule (§12). `next_fire_ms` is advanced by
/// one `interval_ms` every time it fires, independent of whether the fired
/// instance started successfully, so a bad workflow definition can't wedge
/// the schedule.
#[derive(Debug, Clone)]
pub struct ScheduleTrigger {
    pub id: String,
    pub workflow_id: WorkflowDefinitionId,
    pub version: Option<u32>,
    pub input: Value,
    pub interval_ms: u64,
    pub next_fire_ms: u64,
}

/// Starts workflow instances manually, on a schedule, or in response to an
/// event (§12). One `TriggerService` per control plane process, sitting on
/// top of one [`Engine`].
pub struct TriggerService<C: Clock> {
    engine: Arc<Engine>,
    clock: C,
    schedules: Mutex<HashMap<String, ScheduleTrigger>>,
}

impl<C: Clock> TriggerService<C> {
    pub fn new(engine: Arc<Engine>, clock: C) -> Self {
        Self { engine, clock, schedules: Mutex::new(HashMap::new()) }
    }

    /// Manual trigger: create and immediately start an instance.
    pub async fn trigger_manual(
        &self,
        workflow_id: WorkflowDefinitionId,
        version: Option<u32>,
        input: Value,
        now_ms: u64,
    ) -> EngineResult<WorkflowInstanceId> {
        let instance_id = self.engine.create_instance(workflow_id, version, input, None, now_ms)?;
        self.engine.start(&instance_id, now_ms).await?;
        Ok(instance_id)
    }

    /// Event trigger: delegates straight to [`Engine::send_event`], which
    /// resumes every step instance waiting on `event_type`/`correlation_key`
    /// (§4.9). Returns the number of step instances resumed.
    pub async fn trigger_event(
        &self,
        event_type: &str,
        correlation_key: Option<&str>,
        data: Option<Value>,
        now_ms: u64,
    ) -> EngineResult<usize> {
        self.engine.send_event(event_type, correlation_key, data, now_ms).await
    }

    /// Register (or replace) a fixed-interval schedule trigger. The first
    /// fire is one `interval_ms` from `now_ms`, not immediate.
    #[allow(clippy::too_many_arguments)]
    pub fn register_schedule(
        &self,
        id: impl Into<String>,
        workflow_id: WorkflowDefinitionId,
        version: Option<u32>,
        input: Value,
        interval_ms: u64,
        now_ms: u64,
    ) {
        let id = id.into();
        self.schedules
            .lock()
            .insert(id.clone(), ScheduleTrigger { id, workflow_id, version, input, interval_ms, next_fire_ms: now_ms + interval_ms });
    }

    pub fn unregister_schedule(&self, id: &str) {
        self.schedules.lock().remove(id);
    }

    pub fn schedules(&self) -> Vec<ScheduleTrigger> {
        self.schedules.lock().values().cloned().collect()
    }

    /// Fire every schedule whose `next_fire_ms` has elapsed. Each due
    /// schedule is rescheduled before it fires, so a slow or failing start
    /// doesn't cause it to fire twice on the next sweep.
    pub async fn fire_due_schedules(&self, now_ms: u64) {
        let due: Vec<ScheduleTrigger> = {
            let mut schedules = self.schedules.lock();
            let due_ids: Vec<String> = schedules.iter().filter(|(_, s)| s.next_fire_ms <= now_ms).map(|(id, _)| id.clone()).collect();
            due_ids
                .into_iter()
                .filter_map(|id| {
                    schedules.get_mut(&id).map(|s| {
                        let fired = s.clone();
                        s.next_fire_ms = now_ms + s.interval_ms;
                        fired
                    })
                })
                .collect()
        };

        for schedule in due {
            match self.trigger_manual(schedule.workflow_id.clone(), schedule.version, schedule.input.clone(), now_ms).await {
                Ok(instance_id) => info!(schedule_id = %schedule.id, %instance_id, "schedule trigger fired"),
                Err(error) => warn!(schedule_id = %schedule.id, %error, "schedule trigger failed to start instance"),
            }
        }
    }

    fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }
}

/// Periodically calls [`TriggerService::fire_due_schedules`], mirroring the
/// registry's heartbeat sweep and the dispatcher's job-timeout sweep.
pub fn spawn_schedule_sweep<C: Clock>(
    triggers: Arc<TriggerService<C>>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {
                    let now_ms = triggers.now_ms();
                    triggers.fire_due_schedules(now_ms).await;
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
