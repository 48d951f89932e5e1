// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow definition: the declarative, versioned DAG of steps (§3, §4.9
//! initialization, §9 "cyclic/back references use IDs and lookups").

use crate::error::{CoreError, CoreResult};
use crate::ids::{AgentId, Capability, StepId, WorkflowDefinitionId};
use crate::job::{JobPattern, JobRequest};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What the engine does when a step fails (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandlingPolicy {
    StopOnFirstError,
    ContinueAndAggregate,
    Compensate,
}

/// What to do when an Approval step's timeout fires with no decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalTimeoutAction {
    Approve,
    Reject,
}

/// Per-step configuration, tagged by step kind (§4.8). Field names mirror
/// the executor inputs the engine crate consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepConfig {
    #[serde(rename = "step:job")]
    Job {
        command_template: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload_template: Option<String>,
        #[serde(default)]
        priority: i32,
        #[serde(default = "default_pattern")]
        pattern: JobPattern,
        #[serde(default)]
        target_agent_id: Option<AgentId>,
        #[serde(default)]
        target_group: Option<String>,
        #[serde(default)]
        required_capabilities: BTreeSet<Capability>,
    },

    #[serde(rename = "step:delay")]
    Delay { duration_ms: u64 },

    #[serde(rename = "step:transform")]
    Transform { expression: String },

    #[serde(rename = "step:parallel")]
    Parallel {
        branches: Vec<Vec<WorkflowStep>>,
        #[serde(default)]
        max_concurrency: Option<usize>,
        #[serde(default)]
        fail_fast: bool,
    },

    #[serde(rename = "step:conditional")]
    Conditional {
        condition: String,
        then_branch: Vec<WorkflowStep>,
        #[serde(default)]
        else_branch: Vec<WorkflowStep>,
    },

    #[serde(rename = "step:for_each")]
    ForEach {
        collection_expression: String,
        item_variable: String,
        #[serde(default)]
        index_variable: Option<String>,
        #[serde(default)]
        max_concurrency: Option<usize>,
        body: Vec<WorkflowStep>,
    },

    #[serde(rename = "step:sub_workflow")]
    SubWorkflow {
        workflow_id: WorkflowDefinitionId,
        #[serde(default)]
        workflow_version: Option<u32>,
        #[serde(default)]
        input_template: Option<String>,
        #[serde(default)]
        wait_for_completion: bool,
    },

    #[serde(rename = "step:notify")]
    Notify {
        channel: String,
        target_template: String,
        #[serde(default)]
        subject_template: Option<String>,
        message_template: String,
    },

    #[serde(rename = "step:approval")]
    Approval {
        approvers: Vec<String>,
        message_template: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default = "default_timeout_action")]
        timeout_action: ApprovalTimeoutAction,
    },

    #[serde(rename = "step:wait_for_event")]
    WaitForEvent {
        event_type: String,
        #[serde(default)]
        correlation_key: Option<String>,
    },

    #[serde(rename = "step:log")]
    Log {
        message_template: String,
        #[serde(default = "default_log_level")]
        level: LogLevel,
    },
}

fn default_pattern() -> JobPattern {
    JobPattern::RequestResponse
}

fn default_timeout_action() -> ApprovalTimeoutAction {
    ApprovalTimeoutAction::Reject
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl StepConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            StepConfig::Job { .. } => "job",
            StepConfig::Delay { .. } => "delay",
            StepConfig::Transform { .. } => "transform",
            StepConfig::Parallel { .. } => "parallel",
            StepConfig::Conditional { .. } => "conditional",
            StepConfig::ForEach { .. } => "for_each",
            StepConfig::SubWorkflow { .. } => "sub_workflow",
            StepConfig::Notify { .. } => "notify",
            StepConfig::Approval { .. } => "approval",
            StepConfig::WaitForEvent { .. } => "wait_for_event",
            StepConfig::Log { .. } => "log",
        }
    }
}

/// Builds a [`JobRequest`] for a `step:job` config, interpolation already applied.
pub fn job_request_from(command: String, payload: Vec<u8>, config: &StepConfig) -> CoreResult<JobRequest> {
    match config {
        StepConfig::Job { priority, pattern, target_agent_id, target_group, required_capabilities, .. } => {
            let mut req = JobRequest::new(command);
            req.payload = payload;
            req.priority = *priority;
            req.pattern = *pattern;
            req.target_agent_id = target_agent_id.clone();
            req.target_group = target_group.clone();
            req.required_capabilities = required_capabilities.clone();
            Ok(req)
        }
        other => Err(CoreError::Validation(format!(
            "job_request_from called on non-job step config: {}",
            other.kind_name()
        ))),
    }
}

/// One node in a [`WorkflowDefinition`]'s dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub name: String,
    pub config: StepConfig,
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_variable: Option<String>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub retry_delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub continue_on_error: bool,
    /// Compensation to run (in reverse completion order) under the
    /// `Compensate` error-handling policy (§4.9).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<Box<StepConfig>>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<StepId>, name: impl Into<String>, config: StepConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config,
            depends_on: Vec::new(),
            condition: None,
            output_variable: None,
            max_retries: 0,
            retry_delay_ms: 0,
            timeout_ms: None,
            continue_on_error: false,
            compensation: None,
        }
    }

    crate::setters! {
        set {
            depends_on: Vec<StepId>,
            max_retries: u32,
            retry_delay_ms: u64,
            continue_on_error: bool,
        }
        option {
            condition: String,
            output_variable: String,
            timeout_ms: u64,
        }
    }
}

/// A declarative, versioned workflow (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowDefinitionId,
    pub version: u32,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    pub error_handling: ErrorHandlingPolicy,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl WorkflowDefinition {
    pub fn new(id: WorkflowDefinitionId, version: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            version,
            name: name.into(),
            steps: Vec::new(),
            variables: BTreeMap::new(),
            error_handling: ErrorHandlingPolicy::StopOnFirstError,
            tags: BTreeSet::new(),
            enabled: true,
        }
    }

    pub fn step(&self, id: &StepId) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Validate step-id uniqueness, that every `dependsOn` reference resolves,
    /// and return a topological order. Errors with `Validation` on a cycle or
    /// a dangling reference (§3 invariant, §4.9 "a cycle is a validation error").
    pub fn topological_order(&self) -> CoreResult<Vec<StepId>> {
        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.clone()) {
                return Err(CoreError::Validation(format!("duplicate step id: {}", step.id)));
            }
        }
        for step in &self.steps {
            for dep in &step.depends_on {
                if self.step(dep).is_none() {
                    return Err(CoreError::Validation(format!(
                        "step {} depends on unknown step {}",
                        step.id, dep
                    )));
                }
            }
        }

        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Temp,
            Perm,
        }

        let mut marks: IndexMap<StepId, Mark> = IndexMap::new();
        let mut order = Vec::with_capacity(self.steps.len());

        fn visit(
            def: &WorkflowDefinition,
            id: &StepId,
            marks: &mut IndexMap<StepId, Mark>,
            order: &mut Vec<StepId>,
        ) -> CoreResult<()> {
            match marks.get(id) {
                Some(Mark::Perm) => return Ok(()),
                Some(Mark::Temp) => {
                    return Err(CoreError::Validation(format!(
                        "workflow graph has a cycle through step {id}"
                    )))
                }
                None => {}
            }
            marks.insert(id.clone(), Mark::Temp);
            if let Some(step) = def.step(id) {
                for dep in &step.depends_on {
                    visit(def, dep, marks, order)?;
                }
            }
            marks.insert(id.clone(), Mark::Perm);
            order.push(id.clone());
            Ok(())
        }

        for step in &self.steps {
            visit(self, &step.id, &mut marks, &mut order)?;
        }

        Ok(order)
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
