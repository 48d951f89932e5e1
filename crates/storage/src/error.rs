// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage-layer error type (§7 error taxonomy, storage seam).

use orbitmesh_core::{CoreError, ErrorKind};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no such {what} {id}")]
    NotFound { what: &'static str, id: String },

    #[error("version conflict on {what} {id}: expected {expected}, found {actual}")]
    VersionConflict { what: &'static str, id: String, expected: u64, actual: u64 },

    #[error("{what} {id} already exists")]
    AlreadyExists { what: &'static str, id: String },

    #[error("illegal transition on {what} {id}: {source}")]
    IllegalTransition { what: &'static str, id: String, #[source] source: CoreError },

    #[error("wal io error at {path}: {source}")]
    Wal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize event record: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            StorageError::VersionConflict { .. }
            | StorageError::AlreadyExists { .. }
            | StorageError::IllegalTransition { .. } => ErrorKind::Conflict,
            StorageError::Wal { .. } | StorageError::Codec(_) => ErrorKind::Internal,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
