// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn bus() -> StreamBus {
    StreamBus::new(10, 10, 60_000)
}

#[test]
fn progress_reports_out_of_order_or_repeated_sequence_are_dropped() {
    let bus = bus();
    let job_id = JobId::new();

    bus.report_progress(job_id.clone(), 1, Some("starting".into()), 100);
    bus.report_progress(job_id.clone(), 1, Some("stale repeat".into()), 200);
    bus.report_progress(job_id.clone(), 3, Some("skip ahead".into()), 300);
    bus.report_progress(job_id.clone(), 2, Some("out of order".into()), 400);

    let latest = bus.latest_progress(&job_id).unwrap();
    assert_eq!(latest.sequence, 3);
    assert_eq!(latest.message.as_deref(), Some("skip ahead"));
}

#[test]
fn progress_history_is_capped() {
    let bus = StreamBus::new(2, 10, 60_000);
    let job_id = JobId::new();
    for seq in 1..=5 {
        bus.report_progress(job_id.clone(), seq, None, seq * 10);
    }
    let history = bus.progress_history(&job_id);
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().map(|p| p.sequence).collect::<Vec<_>>(), vec![4, 5]);
}

#[tokio::test]
async fn progress_subscriber_receives_updates_pushed_after_subscribing() {
    let bus = bus();
    let job_id = JobId::new();
    let mut rx = bus.subscribe_progress(&job_id);

    bus.report_progress(job_id.clone(), 1, Some("hello".into()), 100);

    let received = rx.recv().await.unwrap();
    assert_eq!(received.sequence, 1);
}

#[test]
fn stream_items_must_strictly_increase_in_sequence() {
    let bus = bus();
    let job_id = JobId::new();

    bus.publish_stream_item(job_id.clone(), 1, json!("a"), false, 100).unwrap();
    let err = bus.publish_stream_item(job_id.clone(), 1, json!("b"), false, 200).unwrap_err();
    assert!(matches!(err, StreamBusError::SequenceNotIncreasing { .. }));
}

#[test]
fn end_of_stream_item_closes_the_stream_to_further_writes() {
    let bus = bus();
    let job_id = JobId::new();

    bus.publish_stream_item(job_id.clone(), 1, json!("a"), true, 100).unwrap();
    let err = bus.publish_stream_item(job_id.clone(), 2, json!("b"), false, 200).unwrap_err();
    assert!(matches!(err, StreamBusError::StreamClosed(_)));
}

#[test]
fn aborted_stream_rejects_further_publishes() {
    let bus = bus();
    let job_id = JobId::new();

    bus.publish_stream_item(job_id.clone(), 1, json!("a"), false, 100).unwrap();
    bus.abort_stream(&job_id, 200);
    let err = bus.publish_stream_item(job_id.clone(), 2, json!("b"), false, 300).unwrap_err();
    assert!(matches!(err, StreamBusError::StreamClosed(_)));
}

#[test]
fn stream_buffer_is_capped_and_replay_only_returns_retained_items() {
    let bus = StreamBus::new(10, 2, 60_000);
    let job_id = JobId::new();
    for seq in 1..=4 {
        bus.publish_stream_item(job_id.clone(), seq, json!(seq), false, seq * 10).unwrap();
    }

    let (replay, _rx) = bus.subscribe_stream(&job_id, 0);
    assert_eq!(replay.iter().map(|i| i.sequence).collect::<Vec<_>>(), vec![3, 4]);
}

#[test]
fn replay_from_sequence_skips_earlier_retained_items() {
    let bus = bus();
    let job_id = JobId::new();
    for seq in 1..=3 {
        bus.publish_stream_item(job_id.clone(), seq, json!(seq), false, seq * 10).unwrap();
    }

    let (replay, _rx) = bus.subscribe_stream(&job_id, 2);
    assert_eq!(replay.iter().map(|i| i.sequence).collect::<Vec<_>>(), vec![2, 3]);
}

#[tokio::test]
async fn stream_subscriber_receives_items_published_after_subscribing() {
    let bus = bus();
    let job_id = JobId::new();
    let (replay, mut rx) = bus.subscribe_stream(&job_id, 0);
    assert!(replay.is_empty());

    bus.publish_stream_item(job_id.clone(), 1, json!("a"), false, 100).unwrap();
    let received = rx.recv().await.unwrap();
    assert_eq!(received.sequence, 1);
}

#[test]
fn clear_drops_all_state_for_a_job() {
    let bus = bus();
    let job_id = JobId::new();
    bus.report_progress(job_id.clone(), 1, None, 100);
    bus.publish_stream_item(job_id.clone(), 1, json!("a"), false, 100).unwrap();

    bus.clear(&job_id);

    assert!(bus.latest_progress(&job_id).is_none());
    let (replay, _rx) = bus.subscribe_stream(&job_id, 0);
    assert!(replay.is_empty());
}

#[test]
fn sweep_drops_long_closed_streams_but_leaves_open_ones() {
    let bus = StreamBus::new(10, 10, 1_000);
    let closed = JobId::new();
    let open = JobId::new();
    bus.publish_stream_item(closed.clone(), 1, json!("a"), true, 0).unwrap();
    bus.publish_stream_item(open.clone(), 1, json!("a"), false, 0).unwrap();

    bus.sweep(5_000);

    let (replay_closed, _) = bus.subscribe_stream(&closed, 0);
    assert!(replay_closed.is_empty());
    let (replay_open, _) = bus.subscribe_stream(&open, 0);
    assert_eq!(replay_open.len(), 1);
}
