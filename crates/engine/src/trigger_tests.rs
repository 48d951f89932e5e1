// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::engine::Engine;
use crate::executors::ExecutorDeps;
use orbitmesh_adapters::{NoopApprovalNotifier, NoopNotificationSender, NoopSubWorkflowLauncher};
use orbitmesh_core::{FakeClock, StepConfig, WorkflowDefinition, WorkflowInstanceStatus, WorkflowStep};
use orbitmesh_storage::{EventStore, InMemoryJobStore, InMemoryWorkflowDefinitionStore, InMemoryWorkflowInstanceStore, WorkflowDefinitionStore};
use serde_json::json;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

fn test_triggers() -> (TriggerService<FakeClock>, Arc<InMemoryWorkflowDefinitionStore>, TempDir) {
    let dir = tempdir().unwrap();
    let events = Arc::new(EventStore::open(dir.path().join("events.wal")).unwrap());
    let definitions = Arc::new(InMemoryWorkflowDefinitionStore::new());
    let instances = Arc::new(InMemoryWorkflowInstanceStore::new());
    let deps = ExecutorDeps {
        job_store: Arc::new(InMemoryJobStore::new()),
        workflow_instance_store: instances.clone(),
        notifier: Arc::new(NoopNotificationSender),
        approvals: Arc::new(NoopApprovalNotifier),
        sub_workflows: Arc::new(NoopSubWorkflowLauncher),
        poll_interval: Duration::from_millis(5),
    };
    let engine = Arc::new(Engine::new(definitions.clone(), instances, events, deps));
    let triggers = TriggerService::new(engine, FakeClock::new());
    (triggers, definitions, dir)
}

fn single_step_def(id: &str) -> WorkflowDefinition {
    let mut d = WorkflowDefinition::new(WorkflowDefinitionId::from_string(id), 1, "test");
    d.steps = vec![WorkflowStep::new("a", "a", StepConfig::Transform { expression: "1 == 1".to_string() }).output_variable("a")];
    d
}

#[tokio::test]
async fn manual_trigger_creates_and_starts_an_instance() {
    let (triggers, definitions, _dir) = test_triggers();
    definitions.save(single_step_def("manual"));

    let instance_id = triggers.trigger_manual(WorkflowDefinitionId::from_string("manual"), None, json!({}), 0).await.unwrap();

    let instance = triggers.engine.instances.get(&instance_id).unwrap();
    assert_eq!(instance.status, WorkflowInstanceStatus::Completed);
}

#[tokio::test]
async fn event_trigger_delegates_to_the_engine_send_event() {
    let (triggers, definitions, _dir) = test_triggers();
    let mut d = single_step_def("waiting");
    d.steps = vec![WorkflowStep::new(
        "wait",
        "wait",
        StepConfig::WaitForEvent { event_type: "order.paid".to_string(), correlation_key: Some("order-1".to_string()) },
    )
    .output_variable("payment")];
    definitions.save(d);
    let instance_id = triggers.trigger_manual(WorkflowDefinitionId::from_string("waiting"), None, json!({}), 0).await.unwrap();
    assert_eq!(triggers.engine.instances.get(&instance_id).unwrap().status, WorkflowInstanceStatus::Paused);

    let resumed = triggers.trigger_event("order.paid", Some("order-1"), Some(json!({"amount": 9})), 10).await.unwrap();

    assert_eq!(resumed, 1);
    assert_eq!(triggers.engine.instances.get(&instance_id).unwrap().status, WorkflowInstanceStatus::Completed);
}

#[tokio::test]
async fn due_schedule_fires_and_is_rescheduled_one_interval_out() {
    let (triggers, definitions, _dir) = test_triggers();
    definitions.save(single_step_def("scheduled"));
    triggers.register_schedule("every-minute", WorkflowDefinitionId::from_string("scheduled"), None, json!({}), 60_000, 0);

    triggers.fire_due_schedules(30_000).await;
    assert_eq!(triggers.engine.instances.list_by_status(WorkflowInstanceStatus::Completed).len(), 0);

    triggers.fire_due_schedules(60_000).await;
    let instances = triggers.engine.instances.list_by_status(WorkflowInstanceStatus::Completed);
    assert_eq!(instances.len(), 1);

    let schedule = triggers.schedules().into_iter().find(|s| s.id == "every-minute").unwrap();
    assert_eq!(schedule.next_fire_ms, 120_000);
}

#[tokio::test]
async fn unregistered_schedule_never_fires_again() {
    let (triggers, definitions, _dir) = test_triggers();
    definitions.save(single_step_def("scheduled"));
    triggers.register_schedule("once", WorkflowDefinitionId::from_string("scheduled"), None, json!({}), 1_000, 0);

    triggers.unregister_schedule("once");
    triggers.fire_due_schedules(1_000).await;

    assert!(triggers.schedules().is_empty());
    assert_eq!(triggers.engine.instances.list_by_status(WorkflowInstanceStatus::Completed).len(), 0);
}
