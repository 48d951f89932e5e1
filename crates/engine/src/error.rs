// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `EngineError` (§7, §10.3): the engine crate's seam error, mapping onto
//! the shared [`ErrorKind`] taxonomy so daemon-level callers can branch on
//! kind without matching every concrete variant.

use orbitmesh_adapters::{ApprovalNotifyError, NotifyError, SubWorkflowLaunchError, TransportError};
use orbitmesh_core::{CoreError, ErrorKind};
use orbitmesh_storage::StorageError;
use thiserror::Error;

use crate::expr::ExprError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("step execution failed: {0}")]
    ExecutorError(String),

    #[error("timed out waiting on step: {0}")]
    Timeout(String),

    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::ExecutorError(_) => ErrorKind::ExecutorError,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => EngineError::Validation(msg),
            CoreError::NotFound(msg) => EngineError::NotFound(msg),
            CoreError::IllegalTransition { from, action } => {
                EngineError::Conflict(format!("illegal transition from {from} via {action}"))
            }
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e.kind() {
            ErrorKind::NotFound => EngineError::NotFound(e.to_string()),
            ErrorKind::Conflict => EngineError::Conflict(e.to_string()),
            ErrorKind::Validation => EngineError::Validation(e.to_string()),
            _ => EngineError::Internal(e.to_string()),
        }
    }
}

impl From<ExprError> for EngineError {
    fn from(e: ExprError) -> Self {
        EngineError::ExecutorError(e.to_string())
    }
}

impl From<TransportError> for EngineError {
    fn from(e: TransportError) -> Self {
        EngineError::ExecutorError(e.to_string())
    }
}

impl From<NotifyError> for EngineError {
    fn from(e: NotifyError) -> Self {
        EngineError::ExecutorError(e.to_string())
    }
}

impl From<ApprovalNotifyError> for EngineError {
    fn from(e: ApprovalNotifyError) -> Self {
        EngineError::ExecutorError(e.to_string())
    }
}

impl From<SubWorkflowLaunchError> for EngineError {
    fn from(e: SubWorkflowLaunchError) -> Self {
        EngineError::ExecutorError(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
