// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy.
//!
//! Every fallible operation in the control plane returns an error whose
//! [`ErrorKind`] is one of a small, fixed set. Concrete error enums in other
//! crates (storage, routing, dispatch, engine) carry richer context but all
//! expose a `kind()` that maps onto this enum, so callers can branch on
//! "is this retryable" without matching every concrete variant.

use thiserror::Error;

/// The taxonomy of §7: what kind of failure this is, independent of which
/// component raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request, unknown step type, cyclic graph, dangling reference.
    /// Never retried.
    Validation,
    /// No such agent/job/instance/definition/event stream.
    NotFound,
    /// CAS version mismatch, duplicate idempotency key with different payload,
    /// illegal state transition attempted.
    Conflict,
    /// Agent channel died while holding an outbound RPC. Transient.
    SessionLost,
    /// Ack, job, approval, or step deadline fired.
    Timeout,
    /// A step executor failed with a typed reason.
    ExecutorError,
    /// Queue full, stream buffer full. Not retried internally.
    Backpressure,
    /// Unexpected invariant violation. Never silently swallowed.
    Internal,
}

impl ErrorKind {
    /// Whether a caller may retry this locally without caller-visible escalation.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::SessionLost | ErrorKind::Conflict | ErrorKind::Timeout)
    }
}

/// Domain-level errors raised by `orbitmesh-core` itself: invariant checks on
/// records, illegal state transitions attempted directly against a domain
/// type (as opposed to through a store's CAS, which wraps these).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("illegal transition: {from} does not allow {action}")]
    IllegalTransition { from: String, action: String },

    #[error("not found: {0}")]
    NotFound(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::IllegalTransition { .. } => ErrorKind::Conflict,
            CoreError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
