// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

#[test]
fn defaults_are_populated_without_a_file() {
    let config = Config::load(None).unwrap();
    assert_eq!(config.heartbeat.interval_ms, 5_000);
    assert_eq!(config.dispatcher.worker_count, 4);
    assert_eq!(config.workflow.approval_default_timeout_action, ApprovalTimeoutAction::Reject);
}

#[test]
fn a_toml_file_overlays_only_the_sections_it_sets() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[dispatcher]\nworker_count = 16\n").unwrap();
    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.dispatcher.worker_count, 16);
    assert_eq!(config.dispatcher.queue_capacity, 1_024);
}

#[test]
fn a_missing_file_is_an_error() {
    let err = Config::load(Some(std::path::Path::new("/nonexistent/orbitmesh.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
