// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! orbitmesh-storage: the event-sourced durability layer for the OrbitMesh
//! control plane — the write-ahead log, the versioned event store built on
//! top of it, and the in-process projection stores each service queries
//! against (§6).

pub mod error;
pub mod event_store;
pub mod state;
pub mod wal;

pub use error::{StorageError, StorageResult};
pub use event_store::EventStore;
pub use state::{
    AgentStore, InMemoryAgentStore, InMemoryJobStore, InMemoryWorkflowDefinitionStore,
    InMemoryWorkflowInstanceStore, JobStore, Versioned, WorkflowDefinitionStore, WorkflowInstanceStore,
};
pub use wal::Wal;
