// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fake transport used by every other crate's tests (§6, §10.5).
//! `FakeAgentSession` records what was sent to it and lets the test feed
//! inbound RPCs; `FakeTransport` is a registry of such sessions indexed by
//! group and capability, mirroring what a real transport would maintain
//! from agent registration metadata.

use super::{AgentSession, AgentToServer, AgentTransport, ServerToAgent, TransportError, TransportResult};
use async_trait::async_trait;
use orbitmesh_core::{AgentId, Capability, SessionId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fake [`AgentSession`]: records outbound sends, serves inbound RPCs from
/// a queue the test pre-fills via [`FakeAgentSession::push_inbound`].
pub struct FakeAgentSession {
    id: SessionId,
    agent_id: AgentId,
    alive: AtomicBool,
    sent: Mutex<Vec<ServerToAgent>>,
    inbound: Mutex<VecDeque<AgentToServer>>,
}

impl FakeAgentSession {
    pub fn new(id: SessionId, agent_id: AgentId) -> Arc<Self> {
        Arc::new(Self {
            id,
            agent_id,
            alive: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            inbound: Mutex::new(VecDeque::new()),
        })
    }

    /// Everything sent to this session so far, in order.
    pub fn sent(&self) -> Vec<ServerToAgent> {
        self.sent.lock().clone()
    }

    /// Queue an RPC for the next `recv()` call to return.
    pub fn push_inbound(&self, message: AgentToServer) {
        self.inbound.lock().push_back(message);
    }

    /// Simulate connection loss: subsequent `send`s fail with `SessionLost`.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentSession for FakeAgentSession {
    fn id(&self) -> &SessionId {
        &self.id
    }

    fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    async fn send(&self, message: ServerToAgent) -> TransportResult<()> {
        if !self.is_alive() {
            return Err(TransportError::SessionLost { session_id: self.id.clone(), reason: "session killed".into() });
        }
        self.sent.lock().push(message);
        Ok(())
    }

    async fn recv(&self) -> Option<AgentToServer> {
        if !self.is_alive() {
            return None;
        }
        self.inbound.lock().pop_front()
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

struct Registration {
    session: Arc<FakeAgentSession>,
    group: Option<String>,
    capabilities: Vec<Capability>,
}

/// Fake [`AgentTransport`]: an in-memory registry of [`FakeAgentSession`]s.
#[derive(Default)]
pub struct FakeTransport {
    sessions: Mutex<HashMap<SessionId, Registration>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session with the group/capabilities a real transport
    /// would have learned at registration time.
    pub fn insert(&self, session: Arc<FakeAgentSession>, group: Option<String>, capabilities: Vec<Capability>) {
        let id = session.id().clone();
        self.sessions.lock().insert(id, Registration { session, group, capabilities });
    }

    pub fn remove(&self, id: &SessionId) {
        self.sessions.lock().remove(id);
    }
}

#[async_trait]
impl AgentTransport for FakeTransport {
    async fn session(&self, id: &SessionId) -> Option<Arc<dyn AgentSession>> {
        self.sessions.lock().get(id).map(|r| r.session.clone() as Arc<dyn AgentSession>)
    }

    async fn sessions_in_group(&self, group: &str) -> Vec<SessionId> {
        self.sessions
            .lock()
            .values()
            .filter(|r| r.group.as_deref() == Some(group))
            .map(|r| r.session.id().clone())
            .collect()
    }

    async fn sessions_with_capability(&self, capability: &Capability) -> Vec<SessionId> {
        self.sessions
            .lock()
            .values()
            .filter(|r| r.capabilities.contains(capability))
            .map(|r| r.session.id().clone())
            .collect()
    }
}
