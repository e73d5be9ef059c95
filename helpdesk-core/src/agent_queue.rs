//! Per-agent bounded assignment set.

use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Agent, AgentCapability, Session};

/// Sessions currently assigned to one agent, capped at the agent's slot count.
#[derive(Debug, Clone)]
pub struct AgentQueue {
    agent: Agent,
    max_slots: usize,
    sessions: HashMap<Uuid, Session>,
}

impl AgentQueue {
    /// `max_slots = floor(maximum_concurrency_per_agent * efficiency)`
    pub fn new(agent: Agent, maximum_concurrency_per_agent: u32) -> Self {
        let max_slots = slot_count(maximum_concurrency_per_agent, agent.level().efficiency_percent());
        Self {
            agent,
            max_slots,
            sessions: HashMap::new(),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub(crate) fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    pub fn queue_size(&self) -> usize {
        self.sessions.len()
    }

    pub fn number_of_open_spots(&self) -> usize {
        self.max_slots.saturating_sub(self.sessions.len())
    }

    pub fn has_open_spots(&self) -> bool {
        self.max_slots > self.sessions.len()
    }

    pub fn contains(&self, session_id: &Uuid) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// No-op when the id is already assigned or the queue is full.
    pub fn add_session(&mut self, session: Session) {
        if self.sessions.contains_key(&session.id) || !self.has_open_spots() {
            return;
        }
        self.sessions.insert(session.id, session);
    }

    /// No-op when the id is not assigned here.
    pub fn remove_session(&mut self, session_id: &Uuid) {
        self.sessions.remove(session_id);
    }
}

/// Integer floor of `concurrency * percent / 100`.
pub(crate) fn slot_count(concurrency: u32, efficiency_percent: u32) -> usize {
    (u64::from(concurrency) * u64::from(efficiency_percent) / 100) as usize
}
