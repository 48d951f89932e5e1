// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workflow scheduling loop (§4.9): instance creation, the eligibility
//! walk that drives a [`WorkflowInstance`] to completion, suspension on
//! `WaitingForEvent`/`WaitingForApproval`, resumption, cancellation, and the
//! `Compensate` error-handling path. Every top-level step executor call goes
//! through [`crate::executors::execute_step`]; this module only decides
//! *which* steps are eligible and persists what they return.
//!
//! Single-writer-per-instance (§5, §9 "workflow instance as an actor") is
//! enforced here with a per-instance `tokio::sync::Mutex` rather than a
//! blocking lock, since a scheduling-loop pass holds the lock across
//! `.await` points.

use crate::context::VarBag;
use crate::error::{EngineError, EngineResult};
use crate::executors::{execute_step, ExecutorDeps, StepOutcome};
use crate::expr;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use orbitmesh_core::{
    CoreError, Event, ErrorHandlingPolicy, StepId, StepInstanceStatus, StreamId, WorkflowDefinitionId, WorkflowInstance,
    WorkflowInstanceId, WorkflowInstanceStatus, WorkflowStep,
};
use orbitmesh_storage::{EventStore, WorkflowDefinitionStore, WorkflowInstanceStore};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Owns instance creation, execution, suspension, resumption, cancellation,
/// and compensation (§4.9). One `Engine` per control plane process.
pub struct Engine {
    pub definitions: Arc<dyn WorkflowDefinitionStore>,
    pub instances: Arc<dyn WorkflowInstanceStore>,
    pub events: Arc<EventStore>,
    pub deps: ExecutorDeps,
    instance_locks: Mutex<HashMap<WorkflowInstanceId, Arc<tokio::sync::Mutex<()>>>>,
    cancellations: Mutex<HashMap<WorkflowInstanceId, CancellationToken>>,
}

impl Engine {
    pub fn new(
        definitions: Arc<dyn WorkflowDefinitionStore>,
        instances: Arc<dyn WorkflowInstanceStore>,
        events: Arc<EventStore>,
        deps: ExecutorDeps,
    ) -> Self {
        Self { definitions, instances, events, deps, instance_locks: Mutex::new(HashMap::new()), cancellations: Mutex::new(HashMap::new()) }
    }

    /// Materialize a new instance: every step of the referenced definition
    /// becomes a Pending `StepInstance`, in topological order (§4.9
    /// Initialization). Does not start it.
    pub fn create_instance(
        &self,
        workflow_id: WorkflowDefinitionId,
        version: Option<u32>,
        input: Value,
        parent_instance_id: Option<WorkflowInstanceId>,
        now_ms: u64,
    ) -> EngineResult<WorkflowInstanceId> {
        let definition = self
            .definitions
            .get(&workflow_id, version)
            .ok_or_else(|| EngineError::NotFound(format!("workflow definition {workflow_id}")))?;
        let order = definition.topological_order()?;

        let instance_id = WorkflowInstanceId::new();
        let mut instance =
            WorkflowInstance::new(instance_id.clone(), definition.id.clone(), definition.version, input, now_ms);
        instance.variables = definition.variables.clone();
        instance.parent_instance_id = parent_instance_id;
        for step_id in &order {
            instance.step_instances.insert(step_id.clone(), orbitmesh_core::StepInstance::pending(step_id.clone()));
        }
        self.instances.create(instance)?;
        self.emit(
            &instance_id,
            vec![Event::WorkflowInstanceCreated {
                instance_id: instance_id.clone(),
                workflow_id: definition.id.clone(),
                workflow_version: definition.version,
            }],
            now_ms,
        );
        Ok(instance_id)
    }

    /// `Pending -> Running` and enter the scheduling loop.
    pub async fn start(&self, instance_id: &WorkflowInstanceId, now_ms: u64) -> EngineResult<()> {
        let _guard = self.lock_instance(instance_id).await;
        let version = self.instances.version_of(instance_id);
        self.instances.update_cas(instance_id, version, &|i| i.start(now_ms))?;
        self.emit(instance_id, vec![Event::WorkflowInstanceStarted { instance_id: instance_id.clone() }], now_ms);
        self.run_scheduling_loop(instance_id, now_ms).await
    }

    /// `Resume(instanceId, signal)` (§4.9): writes `signal` into the single
    /// waiting step's output (or fails it, for a rejected Approval), then
    /// re-enters the scheduling loop.
    pub async fn resume(&self, instance_id: &WorkflowInstanceId, signal: Option<Value>, now_ms: u64) -> EngineResult<()> {
        let _guard = self.lock_instance(instance_id).await;
        let instance = self.instances.get(instance_id).ok_or_else(|| EngineError::NotFound(format!("workflow instance {instance_id}")))?;
        let waiting = instance
            .waiting_step()
            .ok_or_else(|| EngineError::Conflict(format!("workflow instance {instance_id} has no waiting step")))?;
        let step_id = waiting.step_id.clone();
        let was_approval = waiting.status == StepInstanceStatus::WaitingForApproval;
        let rejected = was_approval
            && signal.as_ref().and_then(|v| v.get("approved")).and_then(Value::as_bool).map(|b| !b).unwrap_or(false);

        let signal_for_cas = signal.clone();
        self.instances.update_cas(instance_id, None, &|i| {
            let si = i
                .step_instances
                .get_mut(&step_id)
                .ok_or_else(|| CoreError::NotFound(format!("step instance {step_id}")))?;
            if rejected {
                si.status = StepInstanceStatus::Failed;
                si.error = Some("approval rejected".to_string());
            } else {
                si.status = StepInstanceStatus::Completed;
                si.output = signal_for_cas.clone();
            }
            si.completed_at_ms = Some(now_ms);
            si.waiting_event_type = None;
            si.waiting_correlation_key = None;
            Ok(())
        })?;
        self.emit(instance_id, vec![Event::WorkflowInstanceResumed { instance_id: instance_id.clone(), step_id: step_id.clone() }], now_ms);
        self.instances.update_cas(instance_id, None, &|i| i.resume_running())?;

        if rejected {
            let instance = self.instances.get(instance_id).ok_or_else(|| EngineError::NotFound(instance_id.to_string()))?;
            let definition = self
                .definitions
                .get(&instance.workflow_id, Some(instance.workflow_version))
                .ok_or_else(|| EngineError::NotFound(format!("workflow definition {}", instance.workflow_id)))?;
            let continue_on_error = definition.step(&step_id).map(|s| s.continue_on_error).unwrap_or(false);
            if !continue_on_error && definition.error_handling != ErrorHandlingPolicy::ContinueAndAggregate {
                return self.fail_or_compensate(instance_id, "approval rejected".to_string(), now_ms).await;
            }
        }

        self.run_scheduling_loop(instance_id, now_ms).await
    }

    /// `SendEvent(type, correlationKey?, data?)` (§4.9): resumes every Paused
    /// instance whose waiting step matches. Returns the number resumed.
    pub async fn send_event(&self, event_type: &str, correlation_key: Option<&str>, data: Option<Value>, now_ms: u64) -> EngineResult<usize> {
        let waiting = self.instances.list_waiting_for_event(event_type, correlation_key);
        let mut resumed = 0;
        for instance in waiting {
            match self.resume(&instance.id, data.clone(), now_ms).await {
                Ok(()) => resumed += 1,
                Err(e) => tracing::warn!(instance_id = %instance.id, error = %e, "failed to resume workflow instance on event"),
            }
        }
        Ok(resumed)
    }

    /// `Cancel(instanceId, reason)` (§4.9): rejected if already terminal;
    /// otherwise signals any in-flight step and transitions to Cancelled.
    pub fn cancel(&self, instance_id: &WorkflowInstanceId, reason: &str, now_ms: u64) -> EngineResult<()> {
        let instance = self.instances.get(instance_id).ok_or_else(|| EngineError::NotFound(format!("workflow instance {instance_id}")))?;
        if instance.status.is_terminal() {
            return Err(EngineError::Conflict(format!("workflow instance {instance_id} is already {}", instance.status)));
        }
        if let Some(token) = self.cancellations.lock().get(instance_id) {
            token.cancel();
        }
        self.instances.update_cas(instance_id, None, &|i| i.cancel(reason, now_ms))?;
        self.emit(instance_id, vec![Event::WorkflowInstanceCancelled { instance_id: instance_id.clone(), reason: reason.to_string() }], now_ms);
        Ok(())
    }

    /// The core scheduling loop: repeatedly run every currently-eligible
    /// batch of Pending steps to completion, persist their outcomes, and
    /// recompute eligibility — until the instance suspends, fails, or every
    /// step is resolved (§4.9 Scheduling loop).
    async fn run_scheduling_loop(&self, instance_id: &WorkflowInstanceId, now_ms: u64) -> EngineResult<()> {
        let cancel = self.new_cancel_token(instance_id);

        loop {
            let instance = self.instances.get(instance_id).ok_or_else(|| EngineError::NotFound(instance_id.to_string()))?;
            if instance.status != WorkflowInstanceStatus::Running {
                break;
            }
            let definition = self
                .definitions
                .get(&instance.workflow_id, Some(instance.workflow_version))
                .ok_or_else(|| EngineError::NotFound(format!("workflow definition {}", instance.workflow_id)))?;

            let eligible: Vec<WorkflowStep> = definition
                .steps
                .iter()
                .filter(|step| {
                    instance.step_instances.get(&step.id).map(|si| si.status) == Some(StepInstanceStatus::Pending)
                        && step.depends_on.iter().all(|dep| {
                            instance.step_instances.get(dep).map(|si| si.status.satisfies_dependency()).unwrap_or(false)
                        })
                })
                .cloned()
                .collect();

            if eligible.is_empty() {
                break;
            }

            let bag = VarBag::for_instance(&instance);
            let mut handles = FuturesUnordered::new();
            for step in eligible {
                let bag = bag.clone();
                let cancel = cancel.clone();
                let deps = &self.deps;
                let instance_id = instance_id.clone();
                handles.push(async move {
                    if let Some(condition) = &step.condition {
                        match expr::evaluate_bool(condition, &bag) {
                            Ok(true) => {}
                            Ok(false) => {
                                return (step.id.clone(), step.output_variable.clone(), Ok(StepOutcome { status: StepInstanceStatus::Skipped, ..Default::default() }))
                            }
                            Err(e) => return (step.id.clone(), step.output_variable.clone(), Err(EngineError::from(e))),
                        }
                    }
                    let outcome = execute_step(&step, &instance_id, &bag, deps, now_ms, &cancel).await;
                    (step.id.clone(), step.output_variable.clone(), outcome)
                });
            }

            let mut first_failure: Option<String> = None;
            let mut suspended = false;
            while let Some((step_id, output_variable, result)) = handles.next().await {
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let outcome = StepOutcome { status: StepInstanceStatus::Failed, error: Some(e.to_string()), ..Default::default() };
                        self.persist_step_outcome(instance_id, &step_id, &outcome, now_ms)?;
                        self.emit_step_event(instance_id, &step_id, &outcome, now_ms);
                        if !step_continue_on_error(&definition, &step_id) && definition.error_handling != ErrorHandlingPolicy::ContinueAndAggregate {
                            first_failure.get_or_insert(e.to_string());
                        }
                        continue;
                    }
                };
                self.persist_step_outcome(instance_id, &step_id, &outcome, now_ms)?;
                self.emit_step_event(instance_id, &step_id, &outcome, now_ms);

                if let (Some(output), Some(var)) = (&outcome.output, &output_variable) {
                    let output = output.clone();
                    let var = var.clone();
                    self.instances.update_cas(instance_id, None, &move |i| {
                        i.variables.insert(var.clone(), output.clone());
                        Ok(())
                    })?;
                }

                match outcome.status {
                    StepInstanceStatus::Failed => {
                        if !step_continue_on_error(&definition, &step_id) && definition.error_handling != ErrorHandlingPolicy::ContinueAndAggregate {
                            first_failure.get_or_insert(outcome.error.unwrap_or_default());
                        }
                    }
                    StepInstanceStatus::WaitingForEvent | StepInstanceStatus::WaitingForApproval => suspended = true,
                    _ => {}
                }
            }

            if let Some(error) = first_failure {
                return self.fail_or_compensate(instance_id, error, now_ms).await;
            }
            if suspended {
                let waiting_step_id = self
                    .instances
                    .get(instance_id)
                    .and_then(|i| i.waiting_step().map(|s| s.step_id.clone()))
                    .ok_or_else(|| EngineError::Internal("instance suspended but no waiting step recorded".into()))?;
                self.instances.update_cas(instance_id, None, &|i| i.pause())?;
                self.emit(instance_id, vec![Event::WorkflowInstancePaused { instance_id: instance_id.clone(), step_id: waiting_step_id }], now_ms);
                return Ok(());
            }
        }

        let instance = self.instances.get(instance_id).ok_or_else(|| EngineError::NotFound(instance_id.to_string()))?;
        if instance.status == WorkflowInstanceStatus::Running && instance.all_steps_resolved() {
            let output: serde_json::Map<String, Value> = instance
                .step_instances
                .iter()
                .map(|(id, si)| (id.as_str().to_string(), si.output.clone().unwrap_or(Value::Null)))
                .collect();
            self.instances.update_cas(instance_id, None, &move |i| i.complete(Value::Object(output.clone()), now_ms))?;
            self.emit(instance_id, vec![Event::WorkflowInstanceCompleted { instance_id: instance_id.clone() }], now_ms);
        }
        Ok(())
    }

    /// Under `Compensate`, runs each completed step's declared compensation
    /// in reverse completion order, then transitions the instance to Failed
    /// (§4.9 Completion rules, §3 Compensation).
    async fn fail_or_compensate(&self, instance_id: &WorkflowInstanceId, error: String, now_ms: u64) -> EngineResult<()> {
        let instance = self.instances.get(instance_id).ok_or_else(|| EngineError::NotFound(instance_id.to_string()))?;
        let definition = self
            .definitions
            .get(&instance.workflow_id, Some(instance.workflow_version))
            .ok_or_else(|| EngineError::NotFound(format!("workflow definition {}", instance.workflow_id)))?;

        if definition.error_handling == ErrorHandlingPolicy::Compensate {
            self.instances.update_cas(instance_id, None, &|i| i.start_compensating())?;
            self.emit(instance_id, vec![Event::CompensationStarted { instance_id: instance_id.clone() }], now_ms);

            let cancel = self.new_cancel_token(instance_id);
            let bag = VarBag::for_instance(&instance);
            for (step_id, step_instance) in instance.step_instances.iter().rev() {
                if step_instance.status != StepInstanceStatus::Completed {
                    continue;
                }
                let Some(compensation) = definition.step(step_id).and_then(|s| s.compensation.clone()) else { continue };
                let comp_step = WorkflowStep::new(step_id.clone(), format!("{step_id}-compensation"), *compensation);
                if let Err(e) = execute_step(&comp_step, instance_id, &bag, &self.deps, now_ms, &cancel).await {
                    tracing::warn!(%instance_id, %step_id, error = %e, "compensation step failed");
                }
            }
            self.emit(instance_id, vec![Event::CompensationCompleted { instance_id: instance_id.clone() }], now_ms);
        }

        self.instances.update_cas(instance_id, None, &{
            let error = error.clone();
            move |i| i.fail(error.clone(), now_ms)
        })?;
        self.emit(instance_id, vec![Event::WorkflowInstanceFailed { instance_id: instance_id.clone(), error }], now_ms);
        Ok(())
    }

    fn persist_step_outcome(&self, instance_id: &WorkflowInstanceId, step_id: &StepId, outcome: &StepOutcome, now_ms: u64) -> EngineResult<()> {
        let outcome = outcome.clone();
        let step_id = step_id.clone();
        self.instances.update_cas(instance_id, None, &move |i| {
            let si = i.step_instances.get_mut(&step_id).ok_or_else(|| CoreError::NotFound(format!("step instance {step_id}")))?;
            si.status = outcome.status;
            si.output = outcome.output.clone();
            si.error = outcome.error.clone();
            si.job_id = outcome.job_id.clone();
            si.sub_workflow_instance_id = outcome.sub_workflow_instance_id.clone();
            si.branches = outcome.branches.clone();
            si.waiting_event_type = outcome.waiting_event_type.clone();
            si.waiting_correlation_key = outcome.waiting_correlation_key.clone();
            si.started_at_ms.get_or_insert(now_ms);
            if outcome.status.is_terminal() {
                si.completed_at_ms = Some(now_ms);
            }
            Ok(())
        })?;
        Ok(())
    }

    fn emit_step_event(&self, instance_id: &WorkflowInstanceId, step_id: &StepId, outcome: &StepOutcome, now_ms: u64) {
        let event = match outcome.status {
            StepInstanceStatus::Completed => Event::StepCompleted { instance_id: instance_id.clone(), step_id: step_id.clone() },
            StepInstanceStatus::Skipped => Event::StepSkipped { instance_id: instance_id.clone(), step_id: step_id.clone() },
            StepInstanceStatus::Failed => {
                Event::StepFailed { instance_id: instance_id.clone(), step_id: step_id.clone(), error: outcome.error.clone().unwrap_or_default() }
            }
            _ => return,
        };
        self.emit(instance_id, vec![event], now_ms);
    }

    fn emit(&self, instance_id: &WorkflowInstanceId, events: Vec<Event>, now_ms: u64) {
        let stream = StreamId::workflow_instance(instance_id);
        if let Err(e) = self.events.append(&stream, events, None, now_ms) {
            tracing::warn!(%instance_id, error = %e, "failed to append workflow instance event(s)");
        }
    }

    fn new_cancel_token(&self, instance_id: &WorkflowInstanceId) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancellations.lock().insert(instance_id.clone(), token.clone());
        token
    }

    async fn lock_instance(&self, instance_id: &WorkflowInstanceId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.instance_locks.lock();
            locks.entry(instance_id.clone()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
        };
        lock.lock_owned().await
    }
}

fn step_continue_on_error(definition: &orbitmesh_core::WorkflowDefinition, step_id: &StepId) -> bool {
    definition.step(step_id).map(|s| s.continue_on_error).unwrap_or(false)
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
