// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress & Stream Bus (§4.6): the latest-progress-plus-history feed and
//! the append-only per-job stream buffer that lets the session layer and
//! API surface subscribe to a running job without touching the job store
//! directly. Delivery to subscribers is push-based over a bounded channel;
//! a full subscriber channel drops the item rather than blocking the
//! producer (§4.6 "non-blocking to the producer").

use orbitmesh_core::JobId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub sequence: u64,
    pub message: Option<String>,
    pub at_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem {
    pub sequence: u64,
    pub data: serde_json::Value,
    pub is_end_of_stream: bool,
}

/// Lifecycle of a job's stream buffer (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Completed,
    Aborted,
}

#[derive(Debug, thiserror::Error)]
pub enum StreamBusError {
    #[error("stream for job {0} is already closed")]
    StreamClosed(JobId),

    #[error("stream for job {job_id} received non-increasing sequence {sequence}")]
    SequenceNotIncreasing { job_id: JobId, sequence: u64 },
}

struct ProgressChannel {
    latest: Option<JobProgress>,
    history: VecDeque<JobProgress>,
    subscribers: Vec<mpsc::Sender<JobProgress>>,
}

impl ProgressChannel {
    fn new() -> Self {
        Self { latest: None, history: VecDeque::new(), subscribers: Vec::new() }
    }
}

struct StreamChannel {
    state: StreamState,
    items: VecDeque<StreamItem>,
    subscribers: Vec<mpsc::Sender<StreamItem>>,
    last_touched_ms: u64,
}

impl StreamChannel {
    fn new(now_ms: u64) -> Self {
        Self { state: StreamState::Open, items: VecDeque::new(), subscribers: Vec::new(), last_touched_ms: now_ms }
    }

    fn last_sequence(&self) -> Option<u64> {
        self.items.back().map(|i| i.sequence)
    }
}

#[derive(Default)]
struct JobChannels {
    progress: Option<ProgressChannel>,
    stream: Option<StreamChannel>,
}

/// Per-job progress and stream channels (§4.6). One instance is shared by
/// the dispatcher (producer side) and the API/session layers (consumer
/// side); internally synchronous, so callers `.await` only on the
/// subscriber channels they hold, never on the bus itself.
pub struct StreamBus {
    jobs: Mutex<HashMap<JobId, JobChannels>>,
    progress_history_cap: usize,
    stream_buffer_cap: usize,
    stream_retention_ms: u64,
    subscriber_buffer: usize,
}

impl StreamBus {
    pub fn new(progress_history_cap: usize, stream_buffer_cap: usize, stream_retention_ms: u64) -> Self {
        Self { jobs: Mutex::new(HashMap::new()), progress_history_cap, stream_buffer_cap, stream_retention_ms, subscriber_buffer: 64 }
    }

    /// Record a progress update and fan it out to current subscribers.
    /// Idempotent on `sequence`: a report at or behind the latest recorded
    /// sequence is dropped (§4.3 "Progress() -> Running (idempotent on sequence)").
    pub fn report_progress(&self, job_id: JobId, sequence: u64, message: Option<String>, now_ms: u64) {
        let mut jobs = self.jobs.lock();
        let channels = jobs.entry(job_id).or_default();
        let progress = channels.progress.get_or_insert_with(ProgressChannel::new);

        if let Some(latest) = &progress.latest {
            if sequence <= latest.sequence {
                return;
            }
        }

        let update = JobProgress { sequence, message, at_ms: now_ms };
        progress.history.push_back(update.clone());
        while progress.history.len() > self.progress_history_cap {
            progress.history.pop_front();
        }
        progress.latest = Some(update.clone());
        progress.subscribers.retain(|tx| tx.try_send(update.clone()).is_ok() || !tx.is_closed());
    }

    pub fn latest_progress(&self, job_id: &JobId) -> Option<JobProgress> {
        self.jobs.lock().get(job_id).and_then(|c| c.progress.as_ref()).and_then(|p| p.latest.clone())
    }

    pub fn progress_history(&self, job_id: &JobId) -> Vec<JobProgress> {
        self.jobs.lock().get(job_id).and_then(|c| c.progress.as_ref()).map(|p| p.history.iter().cloned().collect()).unwrap_or_default()
    }

    /// Pull-based progress subscription: the receiver gets every update
    /// from this point forward, non-blocking to the producer (a full
    /// channel just drops the update for that subscriber).
    pub fn subscribe_progress(&self, job_id: &JobId) -> mpsc::Receiver<JobProgress> {
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        let mut jobs = self.jobs.lock();
        let channels = jobs.entry(job_id.clone()).or_default();
        channels.progress.get_or_insert_with(ProgressChannel::new).subscribers.push(tx);
        rx
    }

    /// Append a stream item (§4.6 "append-only, monotonically-sequenced").
    /// Rejects a non-increasing `sequence` or a publish onto a Completed or
    /// Aborted stream. Marking `is_end_of_stream` closes the stream to
    /// further writes.
    pub fn publish_stream_item(&self, job_id: JobId, sequence: u64, data: serde_json::Value, is_end_of_stream: bool, now_ms: u64) -> Result<(), StreamBusError> {
        let mut jobs = self.jobs.lock();
        let channels = jobs.entry(job_id.clone()).or_default();
        let stream = channels.stream.get_or_insert_with(|| StreamChannel::new(now_ms));

        if stream.state != StreamState::Open {
            return Err(StreamBusError::StreamClosed(job_id));
        }
        if let Some(last) = stream.last_sequence() {
            if sequence <= last {
                return Err(StreamBusError::SequenceNotIncreasing { job_id, sequence });
            }
        }

        let item = StreamItem { sequence, data, is_end_of_stream };
        stream.items.push_back(item.clone());
        while stream.items.len() > self.stream_buffer_cap {
            stream.items.pop_front();
        }
        stream.last_touched_ms = now_ms;
        if is_end_of_stream {
            stream.state = StreamState::Completed;
        }
        stream.subscribers.retain(|tx| tx.try_send(item.clone()).is_ok() || !tx.is_closed());
        Ok(())
    }

    /// Mark a stream Aborted: no further items accepted (§4.6 "A stream in
    /// error state is Aborted and producers may not resume").
    pub fn abort_stream(&self, job_id: &JobId, now_ms: u64) {
        let mut jobs = self.jobs.lock();
        let channels = jobs.entry(job_id.clone()).or_default();
        let stream = channels.stream.get_or_insert_with(|| StreamChannel::new(now_ms));
        stream.state = StreamState::Aborted;
        stream.last_touched_ms = now_ms;
    }

    /// Replay every retained item at or after `from_sequence`, plus a live
    /// subscription for anything published after this call (§4.6 "let late
    /// subscribers replay from a given sequence").
    pub fn subscribe_stream(&self, job_id: &JobId, from_sequence: u64) -> (Vec<StreamItem>, mpsc::Receiver<StreamItem>) {
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        let mut jobs = self.jobs.lock();
        let channels = jobs.entry(job_id.clone()).or_default();
        let stream = channels.stream.get_or_insert_with(|| StreamChannel::new(0));
        let replay = stream.items.iter().filter(|i| i.sequence >= from_sequence).cloned().collect();
        stream.subscribers.push(tx);
        (replay, rx)
    }

    /// Drop all state for a job (§4.6 "clear on completion"). Called once
    /// the dispatcher observes a terminal job status.
    pub fn clear(&self, job_id: &JobId) {
        self.jobs.lock().remove(job_id);
    }

    /// Periodically drop long-completed/aborted stream buffers so the bus
    /// doesn't grow unbounded for jobs nobody ever calls `clear` on.
    pub fn sweep(&self, now_ms: u64) {
        let mut jobs = self.jobs.lock();
        let retention = self.stream_retention_ms;
        jobs.retain(|job_id, channels| {
            let Some(stream) = &channels.stream else { return true };
            let expired = stream.state != StreamState::Open && now_ms.saturating_sub(stream.last_touched_ms) > retention;
            if expired {
                trace!(%job_id, "dropping expired stream buffer");
            }
            !expired
        });
    }
}

#[cfg(test)]
#[path = "stream_bus_tests.rs"]
mod tests;
