// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step executors (§4.8). Each executor implements the uniform contract
//! `(instance, step, vars, cancel) -> StepOutcome`; the caller (the
//! scheduling loop in [`crate::engine`]) is responsible for recording the
//! result. Executors are idempotent on retry for the same step instance:
//! `Job` and `SubWorkflow` re-poll their collaborator rather than
//! resubmitting when called again against an already-running step.

use crate::context::VarBag;
use crate::error::{EngineError, EngineResult};
use crate::expr;
use orbitmesh_adapters::{ApprovalNotifier, NotificationSender, SubWorkflowLauncher};
use orbitmesh_core::{
    workflow::job_request_from, ApprovalId, JobId, JobStatus, StepConfig, StepInstanceStatus, StepId, WorkflowDefinition,
    WorkflowInstanceId, WorkflowInstanceStatus, WorkflowStep,
};
use orbitmesh_storage::{JobStore, WorkflowInstanceStore};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Collaborators a step executor may call out to. Shared across every
/// executor invocation for one control plane instance.
pub struct ExecutorDeps {
    pub job_store: Arc<dyn JobStore>,
    pub workflow_instance_store: Arc<dyn WorkflowInstanceStore>,
    pub notifier: Arc<dyn NotificationSender>,
    pub approvals: Arc<dyn ApprovalNotifier>,
    pub sub_workflows: Arc<dyn SubWorkflowLauncher>,
    /// How often `Job`/`SubWorkflow` re-check their collaborator for a
    /// terminal state while awaiting completion.
    pub poll_interval: Duration,
}

/// Outcome of running one step's executor once.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub status: StepInstanceStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub job_id: Option<JobId>,
    pub sub_workflow_instance_id: Option<WorkflowInstanceId>,
    pub branches: Option<Vec<Value>>,
    pub waiting_event_type: Option<String>,
    pub waiting_correlation_key: Option<String>,
}

impl Default for StepOutcome {
    fn default() -> Self {
        Self {
            status: StepInstanceStatus::Pending,
            output: None,
            error: None,
            job_id: None,
            sub_workflow_instance_id: None,
            branches: None,
            waiting_event_type: None,
            waiting_correlation_key: None,
        }
    }
}

impl StepOutcome {
    fn completed(output: Option<Value>) -> Self {
        Self { status: StepInstanceStatus::Completed, output, ..Default::default() }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self { status: StepInstanceStatus::Failed, error: Some(error.into()), ..Default::default() }
    }
}

/// Run one step's executor to completion or suspension.
pub fn execute_step<'a>(
    step: &'a WorkflowStep,
    instance_id: &'a WorkflowInstanceId,
    bag: &'a VarBag,
    deps: &'a ExecutorDeps,
    now_ms: u64,
    cancel: &'a CancellationToken,
) -> Pin<Box<dyn Future<Output = EngineResult<StepOutcome>> + Send + 'a>> {
    Box::pin(async move {
        match &step.config {
            StepConfig::Job { .. } => execute_job(step, bag, deps, now_ms, cancel).await,
            StepConfig::Delay { duration_ms } => execute_delay(*duration_ms, cancel).await,
            StepConfig::Transform { expression } => execute_transform(expression, bag),
            StepConfig::Parallel { branches, max_concurrency, fail_fast } => {
                execute_parallel(branches, *max_concurrency, *fail_fast, instance_id, bag, deps, now_ms, cancel).await
            }
            StepConfig::Conditional { condition, then_branch, else_branch } => {
                execute_conditional(condition, then_branch, else_branch, instance_id, bag, deps, now_ms, cancel).await
            }
            StepConfig::ForEach { collection_expression, item_variable, index_variable, max_concurrency, body } => {
                execute_for_each(
                    collection_expression,
                    item_variable,
                    index_variable.as_deref(),
                    *max_concurrency,
                    body,
                    instance_id,
                    bag,
                    deps,
                    now_ms,
                    cancel,
                )
                .await
            }
            StepConfig::SubWorkflow { workflow_id, workflow_version, input_template, wait_for_completion } => {
                execute_sub_workflow(
                    workflow_id,
                    *workflow_version,
                    input_template.as_deref(),
                    *wait_for_completion,
                    &step.id,
                    instance_id,
                    bag,
                    deps,
                    cancel,
                )
                .await
            }
            StepConfig::Notify { channel, target_template, subject_template, message_template } => {
                execute_notify(channel, target_template, subject_template.as_deref(), message_template, bag, deps).await
            }
            StepConfig::Approval { approvers, message_template, .. } => {
                execute_approval(approvers, message_template, &step.id, instance_id, bag, deps).await
            }
            StepConfig::WaitForEvent { event_type, correlation_key } => {
                execute_wait_for_event(event_type, correlation_key.as_deref(), bag)
            }
            StepConfig::Log { message_template, level } => execute_log(message_template, *level, bag),
        }
    })
}

async fn execute_job(
    step: &WorkflowStep,
    bag: &VarBag,
    deps: &ExecutorDeps,
    now_ms: u64,
    cancel: &CancellationToken,
) -> EngineResult<StepOutcome> {
    let StepConfig::Job { command_template, payload_template, .. } = &step.config else {
        return Err(EngineError::Internal("execute_job called on a non-job step".into()));
    };
    let command = expr::interpolate(command_template, bag)?;
    let payload = match payload_template {
        Some(t) => expr::interpolate(t, bag)?.into_bytes(),
        None => Vec::new(),
    };
    let mut request = job_request_from(command, payload, &step.config)?;
    if let Some(timeout_ms) = step.timeout_ms {
        request.timeout_ms = timeout_ms;
    }

    let job_id = JobId::new();
    let job = orbitmesh_core::Job::new(job_id.clone(), request, now_ms);
    deps.job_store.create(job)?;

    let job = poll_until_terminal(cancel, deps.poll_interval, || deps.job_store.get(&job_id).map(|j| j.status))
        .await
        .and_then(|_| deps.job_store.get(&job_id));

    let Some(job) = job else {
        return Ok(StepOutcome { job_id: Some(job_id), ..StepOutcome::failed("cancelled") });
    };

    match job.status {
        JobStatus::Completed => {
            let output = job
                .result
                .as_deref()
                .map(|bytes| serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())));
            Ok(StepOutcome { job_id: Some(job_id), ..StepOutcome::completed(output) })
        }
        _ => Ok(StepOutcome {
            job_id: Some(job_id),
            ..StepOutcome::failed(job.error.unwrap_or_else(|| format!("job ended in status {}", job.status)))
        }),
    }
}

async fn execute_delay(duration_ms: u64, cancel: &CancellationToken) -> EngineResult<StepOutcome> {
    tokio::select! {
        _ = cancel.cancelled() => Ok(StepOutcome::failed("cancelled")),
        _ = tokio::time::sleep(Duration::from_millis(duration_ms)) => Ok(StepOutcome::completed(None)),
    }
}

fn execute_transform(expression: &str, bag: &VarBag) -> EngineResult<StepOutcome> {
    let value = expr::evaluate(expression, bag)?;
    Ok(StepOutcome::completed(Some(value)))
}

#[allow(clippy::too_many_arguments)]
async fn execute_parallel(
    branches: &[Vec<WorkflowStep>],
    max_concurrency: Option<usize>,
    fail_fast: bool,
    instance_id: &WorkflowInstanceId,
    bag: &VarBag,
    deps: &ExecutorDeps,
    now_ms: u64,
    cancel: &CancellationToken,
) -> EngineResult<StepOutcome> {
    let limit = max_concurrency.unwrap_or(branches.len()).max(1);
    let semaphore = Arc::new(tokio::sync::Semaphore::new(limit));
    // A child token: fail-fast cancels sibling branches of this Parallel step
    // without reaching back up to cancel the instance's own cancellation signal.
    let group_cancel = cancel.child_token();

    // FuturesUnordered rather than join_all: fail_fast needs to cancel sibling
    // branches as soon as one fails, not after every branch has already run
    // to completion.
    let mut handles = futures::stream::FuturesUnordered::new();
    for branch in branches {
        let permit = semaphore.clone();
        let branch = branch.clone();
        let instance_id = instance_id.clone();
        let bag = bag.clone();
        let branch_cancel = group_cancel.clone();
        handles.push(async move {
            let _permit = permit.acquire_owned().await.map_err(|_| EngineError::Internal("semaphore closed".into()))?;
            run_step_group(&branch, &instance_id, &bag, deps, now_ms, &branch_cancel).await
        });
    }

    let mut outputs = Vec::with_capacity(branches.len());
    let mut first_error = None;
    while let Some(result) = futures::StreamExt::next(&mut handles).await {
        match result {
            Ok((_, output)) => outputs.push(output),
            Err(e) => {
                if fail_fast {
                    group_cancel.cancel();
                }
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Ok(StepOutcome::failed(e.to_string())),
        None => Ok(StepOutcome { branches: Some(outputs.clone()), ..StepOutcome::completed(Some(Value::Array(outputs))) }),
    }
}

#[allow(clippy::too_many_arguments)]
async fn execute_conditional(
    condition: &str,
    then_branch: &[WorkflowStep],
    else_branch: &[WorkflowStep],
    instance_id: &WorkflowInstanceId,
    bag: &VarBag,
    deps: &ExecutorDeps,
    now_ms: u64,
    cancel: &CancellationToken,
) -> EngineResult<StepOutcome> {
    let take_then = expr::evaluate_bool(condition, bag)?;
    let branch = if take_then { then_branch } else { else_branch };
    if branch.is_empty() {
        return Ok(StepOutcome::completed(None));
    }
    match run_step_group(branch, instance_id, bag, deps, now_ms, cancel).await {
        Ok((_, output)) => Ok(StepOutcome::completed(Some(output))),
        Err(e) => Ok(StepOutcome::failed(e.to_string())),
    }
}

#[allow(clippy::too_many_arguments)]
async fn execute_for_each(
    collection_expression: &str,
    item_variable: &str,
    index_variable: Option<&str>,
    max_concurrency: Option<usize>,
    body: &[WorkflowStep],
    instance_id: &WorkflowInstanceId,
    bag: &VarBag,
    deps: &ExecutorDeps,
    now_ms: u64,
    cancel: &CancellationToken,
) -> EngineResult<StepOutcome> {
    let collection = expr::evaluate(collection_expression, bag)?;
    let Value::Array(items) = collection else {
        return Err(EngineError::ExecutorError(format!("for_each collection expression did not yield an array: {collection}")));
    };

    let limit = max_concurrency.filter(|c| *c > 1).unwrap_or(1).max(1);
    let semaphore = Arc::new(tokio::sync::Semaphore::new(limit));

    let mut handles = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let permit = semaphore.clone();
        let mut iteration_bag = bag.with(item_variable, item);
        if let Some(index_var) = index_variable {
            iteration_bag.insert(index_var, Value::from(index));
        }
        let body = body.to_vec();
        let instance_id = instance_id.clone();
        let cancel = cancel.clone();
        handles.push(async move {
            let _permit = permit.acquire_owned().await.map_err(|_| EngineError::Internal("semaphore closed".into()))?;
            run_step_group(&body, &instance_id, &iteration_bag, deps, now_ms, &cancel).await
        });
    }

    let results = futures::future::join_all(handles).await;
    let mut outputs = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok((_, output)) => outputs.push(output),
            Err(e) => return Ok(StepOutcome::failed(e.to_string())),
        }
    }
    Ok(StepOutcome { branches: Some(outputs.clone()), ..StepOutcome::completed(Some(Value::Array(outputs))) })
}

#[allow(clippy::too_many_arguments)]
async fn execute_sub_workflow(
    workflow_id: &orbitmesh_core::WorkflowDefinitionId,
    workflow_version: Option<u32>,
    input_template: Option<&str>,
    wait_for_completion: bool,
    step_id: &StepId,
    instance_id: &WorkflowInstanceId,
    bag: &VarBag,
    deps: &ExecutorDeps,
    cancel: &CancellationToken,
) -> EngineResult<StepOutcome> {
    let input = match input_template {
        Some(t) => {
            let rendered = expr::interpolate(t, bag)?;
            serde_json::from_str(&rendered).unwrap_or(Value::String(rendered))
        }
        None => Value::Null,
    };

    let result = deps
        .sub_workflows
        .launch(workflow_id, workflow_version, input, instance_id, step_id, wait_for_completion)
        .await?;

    if !wait_for_completion {
        return Ok(StepOutcome {
            sub_workflow_instance_id: Some(result.child_instance_id),
            ..StepOutcome::completed(result.output)
        });
    }

    if let Some(output) = result.output {
        return Ok(StepOutcome { sub_workflow_instance_id: Some(result.child_instance_id), ..StepOutcome::completed(Some(output)) });
    }

    let child_id = result.child_instance_id.clone();
    let child = poll_until_terminal(cancel, deps.poll_interval, || {
        deps.workflow_instance_store.get(&child_id).map(|i| i.status)
    })
    .await
    .and_then(|_| deps.workflow_instance_store.get(&child_id));

    let Some(child) = child else {
        return Ok(StepOutcome { sub_workflow_instance_id: Some(result.child_instance_id), ..StepOutcome::failed("cancelled") });
    };

    match child.status {
        WorkflowInstanceStatus::Completed => Ok(StepOutcome {
            sub_workflow_instance_id: Some(result.child_instance_id),
            ..StepOutcome::completed(child.output)
        }),
        _ => Ok(StepOutcome {
            sub_workflow_instance_id: Some(result.child_instance_id),
            ..StepOutcome::failed(child.error.unwrap_or_else(|| format!("sub-workflow ended in status {}", child.status)))
        }),
    }
}

async fn execute_notify(
    channel: &str,
    target_template: &str,
    subject_template: Option<&str>,
    message_template: &str,
    bag: &VarBag,
    deps: &ExecutorDeps,
) -> EngineResult<StepOutcome> {
    let target = expr::interpolate(target_template, bag)?;
    let message = expr::interpolate(message_template, bag)?;
    let subject = subject_template.map(|t| expr::interpolate(t, bag)).transpose()?;
    deps.notifier.send(channel, &target, &message, subject.as_deref()).await?;
    Ok(StepOutcome::completed(None))
}

async fn execute_approval(
    approvers: &[String],
    message_template: &str,
    step_id: &StepId,
    instance_id: &WorkflowInstanceId,
    bag: &VarBag,
    deps: &ExecutorDeps,
) -> EngineResult<StepOutcome> {
    let message = expr::interpolate(message_template, bag)?;
    let approval_id = ApprovalId::new();
    deps.approvals.notify_approvers(instance_id, step_id, &approval_id, approvers, &message).await?;
    Ok(StepOutcome {
        status: StepInstanceStatus::WaitingForApproval,
        waiting_event_type: Some("approval".to_string()),
        waiting_correlation_key: Some(approval_id.to_string()),
        ..Default::default()
    })
}

fn execute_wait_for_event(event_type: &str, correlation_key: Option<&str>, _bag: &VarBag) -> EngineResult<StepOutcome> {
    Ok(StepOutcome {
        status: StepInstanceStatus::WaitingForEvent,
        waiting_event_type: Some(event_type.to_string()),
        waiting_correlation_key: correlation_key.map(|s| s.to_string()),
        ..Default::default()
    })
}

fn execute_log(message_template: &str, level: orbitmesh_core::LogLevel, bag: &VarBag) -> EngineResult<StepOutcome> {
    let message = expr::interpolate(message_template, bag)?;
    match level {
        orbitmesh_core::LogLevel::Debug => tracing::debug!(%message, "workflow log step"),
        orbitmesh_core::LogLevel::Info => tracing::info!(%message, "workflow log step"),
        orbitmesh_core::LogLevel::Warn => tracing::warn!(%message, "workflow log step"),
        orbitmesh_core::LogLevel::Error => tracing::error!(%message, "workflow log step"),
    }
    Ok(StepOutcome::completed(Some(Value::String(message))))
}

/// Run a self-contained list of steps (a Parallel branch, a Conditional
/// branch, a ForEach body) to completion, honoring their own internal
/// `dependsOn` graph. Not persisted: the parent step's outcome is the only
/// thing the engine records for these nested steps.
fn run_step_group<'a>(
    steps: &'a [WorkflowStep],
    instance_id: &'a WorkflowInstanceId,
    bag: &'a VarBag,
    deps: &'a ExecutorDeps,
    now_ms: u64,
    cancel: &'a CancellationToken,
) -> Pin<Box<dyn Future<Output = EngineResult<(BTreeMap<StepId, StepOutcome>, Value)>> + Send + 'a>> {
    Box::pin(async move {
        let group = WorkflowDefinition {
            id: orbitmesh_core::WorkflowDefinitionId::new(),
            version: 0,
            name: "step-group".to_string(),
            steps: steps.to_vec(),
            variables: Default::default(),
            error_handling: orbitmesh_core::ErrorHandlingPolicy::StopOnFirstError,
            tags: Default::default(),
            enabled: true,
        };
        let order = group.topological_order().map_err(EngineError::from)?;

        let mut local_bag = bag.clone();
        let mut outcomes: BTreeMap<StepId, StepOutcome> = BTreeMap::new();
        for step_id in &order {
            if cancel.is_cancelled() {
                return Err(EngineError::ExecutorError("cancelled".into()));
            }
            let step = group
                .step(step_id)
                .ok_or_else(|| EngineError::Internal(format!("step {step_id} missing from its own topological order")))?;
            if let Some(condition) = &step.condition {
                if !expr::evaluate_bool(condition, &local_bag)? {
                    outcomes.insert(step_id.clone(), StepOutcome { status: StepInstanceStatus::Skipped, ..Default::default() });
                    continue;
                }
            }
            let outcome = execute_step(step, instance_id, &local_bag, deps, now_ms, cancel).await?;
            if outcome.status == StepInstanceStatus::Failed {
                let error = outcome.error.clone().unwrap_or_default();
                outcomes.insert(step_id.clone(), outcome);
                return Err(EngineError::ExecutorError(error));
            }
            if let Some(output) = &outcome.output {
                local_bag.insert_step_output(step_id, output.clone());
                if let Some(output_variable) = &step.output_variable {
                    local_bag.insert(output_variable.clone(), output.clone());
                }
            }
            outcomes.insert(step_id.clone(), outcome);
        }

        let summary: serde_json::Map<String, Value> = outcomes
            .iter()
            .map(|(id, outcome)| (id.as_str().to_string(), outcome.output.clone().unwrap_or(Value::Null)))
            .collect();
        Ok((outcomes, Value::Object(summary)))
    })
}

/// Poll `check` until it returns a terminal status or `cancel` fires.
/// Returns `None` on cancellation, `Some(())` once the status is terminal.
async fn poll_until_terminal<T, F>(cancel: &CancellationToken, interval: Duration, mut check: F) -> Option<()>
where
    F: FnMut() -> Option<T>,
    T: IsTerminal,
{
    loop {
        match check() {
            Some(status) if status.is_terminal() => return Some(()),
            None => return None,
            Some(_) => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

trait IsTerminal {
    fn is_terminal(&self) -> bool;
}

impl IsTerminal for JobStatus {
    fn is_terminal(&self) -> bool {
        JobStatus::is_terminal(*self)
    }
}

impl IsTerminal for WorkflowInstanceStatus {
    fn is_terminal(&self) -> bool {
        WorkflowInstanceStatus::is_terminal(*self)
    }
}

#[cfg(test)]
#[path = "executors_tests.rs"]
mod tests;
