// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orbitmesh_core::JobId;
use tempfile::tempdir;

fn job_enqueued(job_id: &JobId) -> Event {
    Event::JobEnqueued { job_id: job_id.clone() }
}

#[test]
fn append_assigns_increasing_versions_per_stream() {
    let dir = tempdir().unwrap();
    let store = EventStore::open(dir.path().join("events.wal")).unwrap();
    let job_id = JobId::new();
    let stream = StreamId::job(&job_id);

    let v1 = store.append(&stream, vec![job_enqueued(&job_id)], Some(0), 1).unwrap();
    assert_eq!(v1, 1);
    let v2 = store.append(&stream, vec![Event::JobCompleted { job_id: job_id.clone() }], Some(1), 2).unwrap();
    assert_eq!(v2, 2);
}

#[test]
fn append_with_stale_expected_version_is_a_conflict() {
    let dir = tempdir().unwrap();
    let store = EventStore::open(dir.path().join("events.wal")).unwrap();
    let job_id = JobId::new();
    let stream = StreamId::job(&job_id);

    store.append(&stream, vec![job_enqueued(&job_id)], Some(0), 1).unwrap();
    let err = store.append(&stream, vec![job_enqueued(&job_id)], Some(0), 2).unwrap_err();
    assert!(matches!(err, StorageError::VersionConflict { expected: 0, actual: 1, .. }));
}

#[test]
fn read_stream_returns_only_that_streams_records_in_order() {
    let dir = tempdir().unwrap();
    let store = EventStore::open(dir.path().join("events.wal")).unwrap();
    let a = JobId::new();
    let b = JobId::new();
    let stream_a = StreamId::job(&a);
    let stream_b = StreamId::job(&b);

    store.append(&stream_a, vec![job_enqueued(&a)], None, 1).unwrap();
    store.append(&stream_b, vec![job_enqueued(&b)], None, 2).unwrap();
    store.append(&stream_a, vec![Event::JobCompleted { job_id: a.clone() }], None, 3).unwrap();

    let records = store.read_stream(&stream_a, 0);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].version, 1);
    assert_eq!(records[1].version, 2);
}

#[test]
fn read_all_is_globally_ordered_and_paginated() {
    let dir = tempdir().unwrap();
    let store = EventStore::open(dir.path().join("events.wal")).unwrap();
    let job_id = JobId::new();
    let stream = StreamId::job(&job_id);

    for _ in 0..5 {
        store.append(&stream, vec![job_enqueued(&job_id)], None, 1).unwrap();
    }

    let page = store.read_all(0, 3);
    assert_eq!(page.len(), 3);
    assert_eq!(page[0].position, 1);
    assert_eq!(page[2].position, 3);

    let rest = store.read_all(3, 10);
    assert_eq!(rest.len(), 2);
}

#[test]
fn reopening_rebuilds_versions_from_the_wal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.wal");
    let job_id = JobId::new();
    let stream = StreamId::job(&job_id);
    {
        let store = EventStore::open(&path).unwrap();
        store.append(&stream, vec![job_enqueued(&job_id)], None, 1).unwrap();
        store.append(&stream, vec![Event::JobCompleted { job_id: job_id.clone() }], None, 2).unwrap();
    }

    let store = EventStore::open(&path).unwrap();
    assert_eq!(store.stream_version(&stream), 2);
    assert_eq!(store.read_stream(&stream, 0).len(), 2);
}
