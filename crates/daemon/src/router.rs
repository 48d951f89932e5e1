// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router (§4.4): selects one agent for a [`RoutingRequest`] under a
//! [`RoutingPolicy`]. A pure function of (agent snapshot, job-count
//! snapshot, request) plus an internal round-robin cursor — it never
//! mutates the registry or job store itself; [`crate::dispatcher::Dispatcher`]
//! is the caller that acts on the result.

use orbitmesh_core::{AgentId, AgentRecord, Capability};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    RoundRobin,
    LeastConnections,
    Random,
    PreferredAgentWithFallback,
}

orbitmesh_core::simple_display! {
    RoutingPolicy {
        RoundRobin => "round_robin",
        LeastConnections => "least_connections",
        Random => "random",
        PreferredAgentWithFallback => "preferred_agent_with_fallback",
    }
}

/// Constraints a caller places on which agent may take a job.
#[derive(Debug, Clone, Default)]
pub struct RoutingRequest {
    pub required_capabilities: BTreeSet<Capability>,
    pub preferred_agent_id: Option<AgentId>,
    pub target_group: Option<String>,
    pub tags: BTreeSet<String>,
}

impl RoutingRequest {
    pub fn new() -> Self {
        Self::default()
    }

    orbitmesh_core::setters! {
        option { preferred_agent_id: AgentId, target_group: String }
        set { required_capabilities: BTreeSet<Capability>, tags: BTreeSet<String> }
    }
}

/// Load-balances [`RoutingRequest`]s over a snapshot of agents (§4.4).
///
/// `PreferredAgentWithFallback` is the only policy `preferred_agent_id`
/// affects: when it's set and names a candidate, that agent wins outright;
/// otherwise (or under any other policy) routing falls back to round-robin.
pub struct Router {
    policy: RoutingPolicy,
    cursor: Mutex<usize>,
}

impl Router {
    pub fn new(policy: RoutingPolicy) -> Self {
        Self { policy, cursor: Mutex::new(0) }
    }

    /// Select an agent for `request` out of `agents`, given each candidate's
    /// current Running-or-Assigned job count in `job_counts`. Returns `None`
    /// if no agent satisfies the constraints.
    pub fn route(&self, agents: &[AgentRecord], job_counts: &HashMap<AgentId, usize>, request: &RoutingRequest) -> Option<AgentId> {
        let mut candidates: Vec<&AgentRecord> = agents
            .iter()
            .filter(|a| a.status.is_routable())
            .filter(|a| match &request.target_group {
                Some(group) => a.group.as_deref() == Some(group.as_str()),
                None => true,
            })
            .filter(|a| a.has_all_capabilities(&request.required_capabilities))
            .filter(|a| request.tags.iter().all(|t| a.tags.contains(t)))
            .collect();
        candidates.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        if self.policy == RoutingPolicy::PreferredAgentWithFallback {
            if let Some(preferred) = &request.preferred_agent_id {
                if let Some(agent) = candidates.iter().find(|a| &a.id == preferred) {
                    return Some(agent.id.clone());
                }
            }
        }

        if candidates.is_empty() {
            return None;
        }

        match self.policy {
            RoutingPolicy::RoundRobin | RoutingPolicy::PreferredAgentWithFallback => {
                let mut cursor = self.cursor.lock();
                let idx = *cursor % candidates.len();
                *cursor = cursor.wrapping_add(1);
                Some(candidates[idx].id.clone())
            }
            RoutingPolicy::LeastConnections => candidates
                .iter()
                .min_by_key(|a| job_counts.get(&a.id).copied().unwrap_or(0))
                .map(|a| a.id.clone()),
            RoutingPolicy::Random => candidates.choose(&mut rand::thread_rng()).map(|a| a.id.clone()),
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
