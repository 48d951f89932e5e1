// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration (§6 "Configuration (enumerated)", §10.4). Mirrors the
//! teacher's layering convention: built-in defaults, overlaid by an optional
//! TOML file, overlaid by a small set of environment variables for the
//! tunables operators flip most often.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_ms: 5_000, timeout_ms: 15_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub ack_timeout_ms: u64,
    pub default_job_timeout_ms: u64,
    pub max_unroutable_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub job_timeout_sweep_interval_ms: u64,
    /// Whether `Dispatcher::enqueue` blocks when the queue is full (`true`)
    /// or fails fast with `DispatchError::Backpressure` (`false`).
    pub block_on_full_queue: bool,
    /// Load-balancing policy used by the single shared [`crate::router::Router`].
    pub routing_policy: crate::router::RoutingPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 1_024,
            ack_timeout_ms: 5_000,
            default_job_timeout_ms: 30_000,
            max_unroutable_attempts: 5,
            backoff_base_ms: 100,
            backoff_max_ms: 10_000,
            job_timeout_sweep_interval_ms: 1_000,
            block_on_full_queue: false,
            routing_policy: crate::router::RoutingPolicy::RoundRobin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub progress_history_cap: usize,
    pub stream_buffer_cap: usize,
    pub stream_retention_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { progress_history_cap: 100, stream_buffer_cap: 1_000, stream_retention_ms: 3_600_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalTimeoutAction {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub max_concurrent_instances: usize,
    pub approval_default_timeout_ms: u64,
    pub approval_default_timeout_action: ApprovalTimeoutAction,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_concurrent_instances: 256,
            approval_default_timeout_ms: 86_400_000,
            approval_default_timeout_action: ApprovalTimeoutAction::Reject,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub ttl_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { ttl_ms: 300_000, sweep_interval_ms: 60_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry_max: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub circuit_breaker_failure_ratio: f64,
    pub circuit_breaker_minimum_throughput: u32,
    pub circuit_breaker_break_duration_ms: u64,
    pub circuit_breaker_sampling_duration_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry_max: 3,
            retry_initial_delay_ms: 100,
            retry_max_delay_ms: 5_000,
            circuit_breaker_failure_ratio: 0.5,
            circuit_breaker_minimum_throughput: 10,
            circuit_breaker_break_duration_ms: 30_000,
            circuit_breaker_sampling_duration_ms: 10_000,
        }
    }
}

/// Top-level daemon configuration. Deserialized from TOML; every section
/// falls back to its `Default` when absent from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub heartbeat: HeartbeatConfig,
    pub dispatcher: DispatcherConfig,
    pub stream: StreamConfig,
    pub workflow: WorkflowConfig,
    pub idempotency: IdempotencyConfig,
    pub resilience: ResilienceConfig,
}

impl Config {
    /// Load built-in defaults, overlay an optional TOML file, overlay
    /// environment variables. Unlike the teacher's `OJ_*` env surface (which
    /// also covers socket/pidfile paths), this only exposes the tunables
    /// named in §6 since transport is an external collaborator here.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?
            }
            None => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = level;
        }
        if let Some(ms) = env_u64("ORBITMESH_HEARTBEAT_INTERVAL_MS") {
            self.heartbeat.interval_ms = ms;
        }
        if let Some(ms) = env_u64("ORBITMESH_HEARTBEAT_TIMEOUT_MS") {
            self.heartbeat.timeout_ms = ms;
        }
        if let Some(n) = env_u64("ORBITMESH_DISPATCHER_WORKER_COUNT") {
            self.dispatcher.worker_count = n as usize;
        }
        if let Some(n) = env_u64("ORBITMESH_DISPATCHER_QUEUE_CAPACITY") {
            self.dispatcher.queue_capacity = n as usize;
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat.interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat.timeout_ms)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: std::path::PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: std::path::PathBuf, source: toml::de::Error },
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
