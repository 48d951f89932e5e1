// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observable surface (§6 "Observable surface", §10.6 "Metrics/counters
//! struct"): a flat set of atomic counters, incremented at the same call
//! sites the registry/dispatcher/engine already log from, exposed read-only
//! from [`crate::control_plane::ControlPlane`].

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    pub jobs_enqueued: AtomicU64,
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_timed_out: AtomicU64,
    pub jobs_cancelled: AtomicU64,
    pub sessions_connected: AtomicI64,
    pub workflow_instances_started: AtomicU64,
    pub workflow_instances_completed: AtomicU64,
    pub workflow_instances_failed: AtomicU64,
    pub queue_depth: AtomicI64,
    pub ack_pending: AtomicI64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_timed_out: self.jobs_timed_out.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            sessions_connected: self.sessions_connected.load(Ordering::Relaxed),
            workflow_instances_started: self.workflow_instances_started.load(Ordering::Relaxed),
            workflow_instances_completed: self.workflow_instances_completed.load(Ordering::Relaxed),
            workflow_instances_failed: self.workflow_instances_failed.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            ack_pending: self.ack_pending.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of [`Metrics`], cheap to serialize/log.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_timed_out: u64,
    pub jobs_cancelled: u64,
    pub sessions_connected: i64,
    pub workflow_instances_started: u64,
    pub workflow_instances_completed: u64,
    pub workflow_instances_failed: u64,
    pub queue_depth: i64,
    pub ack_pending: i64,
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
