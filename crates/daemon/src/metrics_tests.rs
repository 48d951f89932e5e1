// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::Ordering;

#[test]
fn snapshot_reflects_counter_updates() {
    let metrics = Metrics::new();
    metrics.jobs_enqueued.fetch_add(3, Ordering::Relaxed);
    metrics.jobs_completed.fetch_add(1, Ordering::Relaxed);
    metrics.sessions_connected.fetch_add(2, Ordering::Relaxed);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.jobs_enqueued, 3);
    assert_eq!(snapshot.jobs_completed, 1);
    assert_eq!(snapshot.sessions_connected, 2);
    assert_eq!(snapshot.jobs_failed, 0);
}
