// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evaluation context glue between [`orbitmesh_core::WorkflowInstance`] and
//! the expression evaluator: workflow variables, prior step outputs (by
//! id), and trigger data all live in one flat namespace so `${fetch.status}`
//! and `${retryCount}` resolve the same way (§4.7).

use crate::expr::{walk, EvalContext, PathSegment};
use orbitmesh_core::{StepId, WorkflowInstance};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A flat bag of bindings: workflow variables and step outputs share one
/// namespace (step ids win on collision, since they're assigned later in
/// topological order than the variables they might shadow).
#[derive(Debug, Clone, Default)]
pub struct VarBag(Map<String, Value>);

impl VarBag {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_variables(variables: &BTreeMap<String, Value>) -> Self {
        let mut map = Map::new();
        for (k, v) in variables {
            map.insert(k.clone(), v.clone());
        }
        Self(map)
    }

    /// Build the context for one pass of the scheduling loop: variables
    /// overlaid with every step's recorded output, plus `trigger` bound to
    /// the instance's input.
    pub fn for_instance(instance: &WorkflowInstance) -> Self {
        let mut bag = Self::from_variables(&instance.variables);
        bag.0.insert("trigger".to_string(), instance.input.clone());
        for (step_id, step) in &instance.step_instances {
            if let Some(output) = &step.output {
                bag.insert_step_output(step_id, output.clone());
            }
        }
        bag
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn insert_step_output(&mut self, step_id: &StepId, output: Value) {
        self.0.insert(step_id.as_str().to_string(), output);
    }

    /// A copy of this bag with one extra binding, used for `ForEach`'s
    /// per-iteration `itemVariable`/`indexVariable`.
    pub fn with(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.insert(key, value);
        next
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl EvalContext for VarBag {
    fn resolve(&self, segments: &[PathSegment]) -> Option<Value> {
        walk(&Value::Object(self.0.clone()), segments)
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
