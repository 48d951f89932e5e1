// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session layer's abstract transport contract (§4.2, §6 "Transport
//! contract"). `AgentTransport` groups live connections by capability or
//! group tag; `AgentSession` is one bidirectional, order-preserving channel
//! to a single agent. Neither trait says anything about how bytes actually
//! move — a real implementation might sit on WebSocket, gRPC, or a Unix
//! socket; tests use the in-memory fake below.

use async_trait::async_trait;
use orbitmesh_core::{AgentId, Capability, ErrorKind, JobId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Server-to-agent RPCs (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerToAgent {
    ExecuteJob { job_id: JobId, command: String, payload: Vec<u8>, timeout_ms: u64 },
    CancelJob { job_id: JobId, reason: String },
    ProbeHealth,
    RequestResourceReport,
    ValidateJob { job_id: JobId, command: String },
    ResyncState,
}

/// Agent-to-server RPCs (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentToServer {
    Register { agent_id: AgentId, name: String, capabilities: Vec<Capability>, group: Option<String> },
    Heartbeat { agent_id: AgentId, at_ms: u64 },
    AckJob { job_id: JobId },
    ReportProgress { job_id: JobId, sequence: u64, message: Option<String> },
    ReportStreamItem { job_id: JobId, sequence: u64, data: serde_json::Value, is_end_of_stream: bool },
    ReportResult { job_id: JobId, result: Vec<u8> },
    ReportState { reported_state: BTreeMap<String, String> },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("session {session_id} lost: {reason}")]
    SessionLost { session_id: SessionId, reason: String },

    #[error("send to {session_id} timed out after {timeout_ms}ms")]
    Timeout { session_id: SessionId, timeout_ms: u64 },

    #[error("outbound channel to {session_id} is full")]
    Backpressure { session_id: SessionId },
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::SessionLost { .. } => ErrorKind::SessionLost,
            TransportError::Timeout { .. } => ErrorKind::Timeout,
            TransportError::Backpressure { .. } => ErrorKind::Backpressure,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// One live bidirectional channel to one agent. Single-producer for
/// outbound sends, single-consumer for inbound receives, preserving order
/// on both directions (§4.2 concurrency note).
#[async_trait]
pub trait AgentSession: Send + Sync {
    fn id(&self) -> &SessionId;
    fn agent_id(&self) -> &AgentId;

    /// Send one RPC to the agent. Resolves once the channel accepted the
    /// frame, or fails with `SessionLost`/`Timeout`/`Backpressure`.
    async fn send(&self, message: ServerToAgent) -> TransportResult<()>;

    /// Pull the next inbound RPC. `None` once the session has closed and
    /// every already-buffered message has been drained.
    async fn recv(&self) -> Option<AgentToServer>;

    fn is_alive(&self) -> bool;
}

/// Groups live sessions and hands out handles to individual ones (§6).
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn session(&self, id: &SessionId) -> Option<Arc<dyn AgentSession>>;
    async fn sessions_in_group(&self, group: &str) -> Vec<SessionId>;
    async fn sessions_with_capability(&self, capability: &Capability) -> Vec<SessionId>;

    /// Send the same message to every listed session, collecting the
    /// per-session outcome rather than failing the whole broadcast on one
    /// bad session.
    async fn broadcast(&self, ids: &[SessionId], message: ServerToAgent) -> Vec<(SessionId, TransportResult<()>)> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = match self.session(id).await {
                Some(session) => session.send(message.clone()).await,
                None => Err(TransportError::SessionLost { session_id: id.clone(), reason: "no such session".into() }),
            };
            results.push((id.clone(), outcome));
        }
        results
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgentSession, FakeTransport};

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
