// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orbitmesh_adapters::{FakeApprovalNotifier, FakeNotificationSender, FakeSubWorkflowLauncher, NoopApprovalNotifier, NoopNotificationSender, NoopSubWorkflowLauncher};
use orbitmesh_core::{AgentId, StepId, WorkflowDefinitionId, WorkflowInstanceId};
use orbitmesh_storage::{InMemoryJobStore, InMemoryWorkflowInstanceStore};
use serde_json::json;
use std::time::Duration;

fn deps() -> ExecutorDeps {
    ExecutorDeps {
        job_store: Arc::new(InMemoryJobStore::new()),
        workflow_instance_store: Arc::new(InMemoryWorkflowInstanceStore::new()),
        notifier: Arc::new(NoopNotificationSender),
        approvals: Arc::new(NoopApprovalNotifier),
        sub_workflows: Arc::new(NoopSubWorkflowLauncher),
        poll_interval: Duration::from_millis(5),
    }
}

fn instance_id() -> WorkflowInstanceId {
    WorkflowInstanceId::new()
}

#[tokio::test]
async fn transform_step_evaluates_into_output() {
    let step = WorkflowStep::new("t1", "transform", StepConfig::Transform { expression: "1 == 1".to_string() });
    let bag = VarBag::new();
    let outcome = execute_step(&step, &instance_id(), &bag, &deps(), 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Completed);
    assert_eq!(outcome.output, Some(json!(true)));
}

#[tokio::test]
async fn delay_step_completes_after_its_duration() {
    let step = WorkflowStep::new("d1", "delay", StepConfig::Delay { duration_ms: 5 });
    let bag = VarBag::new();
    let outcome = execute_step(&step, &instance_id(), &bag, &deps(), 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Completed);
}

#[tokio::test]
async fn delay_step_fails_as_cancelled_when_token_fires() {
    let step = WorkflowStep::new("d1", "delay", StepConfig::Delay { duration_ms: 60_000 });
    let bag = VarBag::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = execute_step(&step, &instance_id(), &bag, &deps(), 0, &cancel).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Failed);
    assert_eq!(outcome.error.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn log_step_emits_and_completes_with_rendered_message() {
    let mut bag = VarBag::new();
    bag.insert("name", json!("orbit"));
    let step = WorkflowStep::new(
        "l1",
        "log",
        StepConfig::Log { message_template: "hello ${name}".to_string(), level: orbitmesh_core::LogLevel::Info },
    );
    let outcome = execute_step(&step, &instance_id(), &bag, &deps(), 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Completed);
    assert_eq!(outcome.output, Some(json!("hello orbit")));
}

#[tokio::test]
async fn wait_for_event_step_suspends_immediately_with_its_fields() {
    let step = WorkflowStep::new(
        "w1",
        "wait",
        StepConfig::WaitForEvent { event_type: "payment.received".to_string(), correlation_key: Some("order-1".to_string()) },
    );
    let bag = VarBag::new();
    let outcome = execute_step(&step, &instance_id(), &bag, &deps(), 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::WaitingForEvent);
    assert_eq!(outcome.waiting_event_type.as_deref(), Some("payment.received"));
    assert_eq!(outcome.waiting_correlation_key.as_deref(), Some("order-1"));
}

#[tokio::test]
async fn approval_step_notifies_approvers_and_encodes_approval_id_in_correlation_key() {
    let approvals = Arc::new(FakeApprovalNotifier::new());
    let mut deps = deps();
    deps.approvals = approvals.clone();

    let step = WorkflowStep::new(
        "a1",
        "approval",
        StepConfig::Approval {
            approvers: vec!["alice".to_string()],
            message_template: "please review ${name}".to_string(),
            timeout_ms: None,
            timeout_action: orbitmesh_core::ApprovalTimeoutAction::Reject,
        },
    );
    let mut bag = VarBag::new();
    bag.insert("name", json!("order-42"));

    let outcome = execute_step(&step, &instance_id(), &bag, &deps, 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::WaitingForApproval);
    assert_eq!(outcome.waiting_event_type.as_deref(), Some("approval"));
    let correlation_key = outcome.waiting_correlation_key.expect("approval correlation key set");

    let calls = approvals.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].approval_id.to_string(), correlation_key);
    assert_eq!(calls[0].message, "please review order-42");
}

#[tokio::test]
async fn notify_step_sends_through_the_collaborator() {
    let notifier = Arc::new(FakeNotificationSender::new());
    let mut deps = deps();
    deps.notifier = notifier.clone();

    let step = WorkflowStep::new(
        "n1",
        "notify",
        StepConfig::Notify {
            channel: "webhook".to_string(),
            target_template: "https://example.invalid/${id}".to_string(),
            subject_template: Some("order ${id}".to_string()),
            message_template: "order ${id} is ready".to_string(),
        },
    );
    let mut bag = VarBag::new();
    bag.insert("id", json!(42));

    let outcome = execute_step(&step, &instance_id(), &bag, &deps, 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Completed);

    let calls = notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].target, "https://example.invalid/42");
    assert_eq!(calls[0].subject.as_deref(), Some("order 42"));
    assert_eq!(calls[0].message, "order 42 is ready");
}

#[tokio::test]
async fn conditional_step_runs_then_branch_when_condition_is_true() {
    let then_branch = vec![WorkflowStep::new("t", "t", StepConfig::Transform { expression: "\"then\"".to_string() })];
    let else_branch = vec![WorkflowStep::new("e", "e", StepConfig::Transform { expression: "\"else\"".to_string() })];
    let step = WorkflowStep::new(
        "c1",
        "conditional",
        StepConfig::Conditional { condition: "flag == true".to_string(), then_branch, else_branch },
    );
    let mut bag = VarBag::new();
    bag.insert("flag", json!(true));

    let outcome = execute_step(&step, &instance_id(), &bag, &deps(), 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Completed);
    assert_eq!(outcome.output, Some(json!({"t": "then"})));
}

#[tokio::test]
async fn conditional_step_runs_else_branch_when_condition_is_false() {
    let then_branch = vec![WorkflowStep::new("t", "t", StepConfig::Transform { expression: "\"then\"".to_string() })];
    let else_branch = vec![WorkflowStep::new("e", "e", StepConfig::Transform { expression: "\"else\"".to_string() })];
    let step = WorkflowStep::new(
        "c1",
        "conditional",
        StepConfig::Conditional { condition: "flag == true".to_string(), then_branch, else_branch },
    );
    let mut bag = VarBag::new();
    bag.insert("flag", json!(false));

    let outcome = execute_step(&step, &instance_id(), &bag, &deps(), 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Completed);
    assert_eq!(outcome.output, Some(json!({"e": "else"})));
}

#[tokio::test]
async fn conditional_step_with_empty_branch_completes_with_no_output() {
    let step = WorkflowStep::new("c1", "conditional", StepConfig::Conditional { condition: "false".to_string(), then_branch: vec![], else_branch: vec![] });
    let bag = VarBag::new();
    let outcome = execute_step(&step, &instance_id(), &bag, &deps(), 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Completed);
    assert_eq!(outcome.output, None);
}

#[tokio::test]
async fn for_each_step_runs_body_sequentially_over_each_item() {
    let body = vec![WorkflowStep::new("double", "double", StepConfig::Transform { expression: "item * 2".to_string() })];
    let step = WorkflowStep::new(
        "f1",
        "for_each",
        StepConfig::ForEach {
            collection_expression: "items".to_string(),
            item_variable: "item".to_string(),
            index_variable: None,
            max_concurrency: None,
            body,
        },
    );
    let mut bag = VarBag::new();
    bag.insert("items", json!([1, 2, 3]));

    let outcome = execute_step(&step, &instance_id(), &bag, &deps(), 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Completed);
    assert_eq!(outcome.branches, Some(vec![json!({"double": 2}), json!({"double": 4}), json!({"double": 6})]));
}

#[tokio::test]
async fn for_each_step_rejects_a_non_array_collection() {
    let step = WorkflowStep::new(
        "f1",
        "for_each",
        StepConfig::ForEach {
            collection_expression: "items".to_string(),
            item_variable: "item".to_string(),
            index_variable: None,
            max_concurrency: None,
            body: vec![],
        },
    );
    let mut bag = VarBag::new();
    bag.insert("items", json!("not-an-array"));

    let err = execute_step(&step, &instance_id(), &bag, &deps(), 0, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::ExecutorError(_)));
}

#[tokio::test]
async fn parallel_step_runs_every_branch_and_collects_outputs() {
    let branches = vec![
        vec![WorkflowStep::new("a", "a", StepConfig::Transform { expression: "\"a\"".to_string() })],
        vec![WorkflowStep::new("b", "b", StepConfig::Transform { expression: "\"b\"".to_string() })],
    ];
    let step = WorkflowStep::new("p1", "parallel", StepConfig::Parallel { branches, max_concurrency: None, fail_fast: false });
    let bag = VarBag::new();

    let outcome = execute_step(&step, &instance_id(), &bag, &deps(), 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Completed);
    let branches = outcome.branches.unwrap();
    assert_eq!(branches.len(), 2);
    assert!(branches.contains(&json!({"a": "a"})));
    assert!(branches.contains(&json!({"b": "b"})));
}

#[tokio::test]
async fn parallel_step_fail_fast_cancels_the_sibling_branch_before_it_completes() {
    let notifier = Arc::new(FakeNotificationSender::new());
    let mut deps = deps();
    deps.notifier = notifier.clone();

    // The long branch sleeps, then notifies; fail_fast should cancel it
    // before the notify step ever runs.
    let long_branch = vec![
        WorkflowStep::new("sleep", "sleep", StepConfig::Delay { duration_ms: 60_000 }),
        WorkflowStep::new(
            "notify",
            "notify",
            StepConfig::Notify {
                channel: "webhook".to_string(),
                target_template: "https://example.invalid".to_string(),
                subject_template: None,
                message_template: "should never fire".to_string(),
            },
        )
        .depends_on(vec![StepId::new("sleep")]),
    ];
    // Fails immediately: `boom` is not a bound variable.
    let failing_branch = vec![WorkflowStep::new("boom", "boom", StepConfig::Transform { expression: "boom".to_string() })];

    let step = WorkflowStep::new(
        "p1",
        "parallel",
        StepConfig::Parallel { branches: vec![long_branch, failing_branch], max_concurrency: None, fail_fast: true },
    );
    let bag = VarBag::new();

    let outcome = execute_step(&step, &instance_id(), &bag, &deps, 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Failed);
    assert!(notifier.calls().is_empty(), "fail_fast should have cancelled the sleeping branch before its notify step ran");
}

#[tokio::test]
async fn job_step_polls_until_completion_and_parses_json_result() {
    let job_store = Arc::new(InMemoryJobStore::new());
    let mut deps = deps();
    deps.job_store = job_store.clone();

    let step = WorkflowStep::new(
        "j1",
        "job",
        StepConfig::Job {
            command_template: "do-the-thing".to_string(),
            payload_template: None,
            priority: 0,
            pattern: orbitmesh_core::JobPattern::RequestResponse,
            target_agent_id: None,
            target_group: None,
            required_capabilities: Default::default(),
        },
    );
    let bag = VarBag::new();

    let completer = tokio::spawn({
        let job_store = job_store.clone();
        async move {
            // Wait for the executor to have created its job, then walk it to completion.
            let job_id = loop {
                let pending = job_store.list_pending_ordered();
                if let Some(job) = pending.into_iter().next() {
                    break job.id;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            };
            let agent_id = AgentId::new();
            job_store
                .update_cas(&job_id, None, &|job| {
                    job.assign(agent_id.clone(), 0)?;
                    job.ack(0)?;
                    job.complete(br#"{"ok":true}"#.to_vec(), 0)
                })
                .unwrap();
        }
    });

    let outcome = execute_step(&step, &instance_id(), &bag, &deps, 0, &CancellationToken::new()).await.unwrap();
    completer.await.unwrap();

    assert_eq!(outcome.status, StepInstanceStatus::Completed);
    assert_eq!(outcome.output, Some(json!({"ok": true})));
    assert!(outcome.job_id.is_some());
}

#[tokio::test]
async fn job_step_fails_when_the_job_ends_in_a_failed_state() {
    let job_store = Arc::new(InMemoryJobStore::new());
    let mut deps = deps();
    deps.job_store = job_store.clone();

    let step = WorkflowStep::new(
        "j1",
        "job",
        StepConfig::Job {
            command_template: "do-the-thing".to_string(),
            payload_template: None,
            priority: 0,
            pattern: orbitmesh_core::JobPattern::RequestResponse,
            target_agent_id: None,
            target_group: None,
            required_capabilities: Default::default(),
        },
    );
    let bag = VarBag::new();

    let completer = tokio::spawn({
        let job_store = job_store.clone();
        async move {
            let job_id = loop {
                let pending = job_store.list_pending_ordered();
                if let Some(job) = pending.into_iter().next() {
                    break job.id;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            };
            let agent_id = AgentId::new();
            job_store
                .update_cas(&job_id, None, &|job| {
                    job.assign(agent_id.clone(), 0)?;
                    job.ack(0)?;
                    job.fail("agent blew up", false, 0, 0)
                })
                .unwrap();
        }
    });

    let outcome = execute_step(&step, &instance_id(), &bag, &deps, 0, &CancellationToken::new()).await.unwrap();
    completer.await.unwrap();

    assert_eq!(outcome.status, StepInstanceStatus::Failed);
    assert_eq!(outcome.error.as_deref(), Some("agent blew up"));
}

#[tokio::test]
async fn sub_workflow_step_fire_and_forget_completes_without_polling() {
    let launcher = Arc::new(FakeSubWorkflowLauncher::new());
    let mut deps = deps();
    deps.sub_workflows = launcher.clone();

    let step = WorkflowStep::new(
        "s1",
        "sub",
        StepConfig::SubWorkflow {
            workflow_id: WorkflowDefinitionId::new(),
            workflow_version: None,
            input_template: None,
            wait_for_completion: false,
        },
    );
    let bag = VarBag::new();

    let outcome = execute_step(&step, &instance_id(), &bag, &deps, 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Completed);
    assert!(outcome.sub_workflow_instance_id.is_some());
    assert_eq!(launcher.calls().len(), 1);
    assert!(!launcher.calls()[0].wait_for_completion);
}

#[tokio::test]
async fn sub_workflow_step_waits_for_completion_when_the_launcher_already_has_output() {
    let launcher = Arc::new(FakeSubWorkflowLauncher::new());
    *launcher.output.lock() = Some(json!({"child": "done"}));
    let mut deps = deps();
    deps.sub_workflows = launcher.clone();

    let step = WorkflowStep::new(
        "s1",
        "sub",
        StepConfig::SubWorkflow {
            workflow_id: WorkflowDefinitionId::new(),
            workflow_version: None,
            input_template: None,
            wait_for_completion: true,
        },
    );
    let bag = VarBag::new();

    let outcome = execute_step(&step, &instance_id(), &bag, &deps, 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.status, StepInstanceStatus::Completed);
    assert_eq!(outcome.output, Some(json!({"child": "done"})));
}
