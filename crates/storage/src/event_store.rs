// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative event log (§6 `EventStore`): `append` with optimistic
//! concurrency per stream, `read_stream`, and `read_all`. Backed by
//! [`crate::wal::Wal`] on disk and a parking_lot-guarded in-memory index for
//! fast reads — the WAL is replayed once at `open` to rebuild that index, so
//! restart recovers both the per-stream version table and the positional
//! order without re-deriving it from anything but the log itself.

use crate::error::{StorageError, StorageResult};
use crate::wal::Wal;
use orbitmesh_core::{Event, EventId, EventRecord, StreamId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

struct Index {
    /// All records in append order; index into this vec is `position - 1`.
    all: Vec<EventRecord>,
    /// stream_id -> indices into `all`, in version order.
    by_stream: HashMap<StreamId, Vec<usize>>,
    /// stream_id -> current version (0 if the stream has never been written).
    versions: HashMap<StreamId, u64>,
}

impl Index {
    fn new() -> Self {
        Index { all: Vec::new(), by_stream: HashMap::new(), versions: HashMap::new() }
    }

    fn record(&mut self, record: EventRecord) {
        let idx = self.all.len();
        let stream = record.stream_id.clone();
        self.versions.insert(stream.clone(), record.version);
        self.by_stream.entry(stream).or_default().push(idx);
        self.all.push(record);
    }

    fn version_of(&self, stream_id: &StreamId) -> u64 {
        self.versions.get(stream_id).copied().unwrap_or(0)
    }
}

pub struct EventStore {
    path: std::path::PathBuf,
    wal: Mutex<Wal>,
    index: Mutex<Index>,
}

impl EventStore {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut wal = Wal::open(&path, 0).map_err(|source| StorageError::Wal { path: path.clone(), source })?;

        let mut index = Index::new();
        for record in wal.entries_after(0).map_err(|source| StorageError::Wal { path: path.clone(), source })? {
            index.record(record);
        }
        wal.mark_processed(index.all.len() as u64);

        Ok(EventStore { path, wal: Mutex::new(wal), index: Mutex::new(index) })
    }

    /// Append `events` to `stream_id`, failing with [`StorageError::VersionConflict`]
    /// if `expected_version` is given and doesn't match the stream's current
    /// version. Returns the stream's version after the append.
    pub fn append(
        &self,
        stream_id: &StreamId,
        events: Vec<Event>,
        expected_version: Option<u64>,
        timestamp_ms: u64,
    ) -> StorageResult<u64> {
        let mut index = self.index.lock();
        let current = index.version_of(stream_id);
        if let Some(expected) = expected_version {
            if expected != current {
                return Err(StorageError::VersionConflict {
                    what: "stream",
                    id: stream_id.to_string(),
                    expected,
                    actual: current,
                });
            }
        }

        let mut wal = self.wal.lock();
        let mut version = current;
        for event in events {
            version += 1;
            let record = EventRecord {
                event_id: EventId::new(),
                stream_id: stream_id.clone(),
                event,
                version,
                position: 0,
                timestamp_ms,
            };
            let seq = wal.append(record.clone()).map_err(|source| StorageError::Wal { path: self.path.clone(), source })?;
            let mut positioned = record;
            positioned.position = seq;
            index.record(positioned);
        }
        wal.flush().map_err(|source| StorageError::Wal { path: self.path.clone(), source })?;
        wal.mark_processed(index.all.len() as u64);

        Ok(version)
    }

    /// Records of `stream_id` with `version > from_version`, in version order.
    pub fn read_stream(&self, stream_id: &StreamId, from_version: u64) -> Vec<EventRecord> {
        let index = self.index.lock();
        let Some(indices) = index.by_stream.get(stream_id) else { return Vec::new() };
        indices
            .iter()
            .map(|&i| index.all[i].clone())
            .filter(|r| r.version > from_version)
            .collect()
    }

    /// Up to `max_count` records with `position > from_position`, in global order.
    pub fn read_all(&self, from_position: u64, max_count: usize) -> Vec<EventRecord> {
        let index = self.index.lock();
        index
            .all
            .iter()
            .filter(|r| r.position > from_position)
            .take(max_count)
            .cloned()
            .collect()
    }

    pub fn stream_version(&self, stream_id: &StreamId) -> u64 {
        self.index.lock().version_of(stream_id)
    }
}

#[cfg(test)]
#[path = "event_store_tests.rs"]
mod tests;
