//! Allocation Manager: owns every agent queue and dispatches sessions to them.
//!
//! Dispatch order among available agents with open slots:
//! - ascending priority (Junior first)
//! - then ascending queue size (least loaded within a tier)
//! - then configured roster order
//!
//! The lowest tier therefore saturates before the next one receives work, and
//! load spreads evenly inside a tier.
//!
//! The queue list and the session → queue map sit behind one mutex so request
//! handlers and the expiration sweep cannot interleave partial updates.

use chrono::NaiveTime;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::agent_queue::AgentQueue;
use crate::clock::Clock;
use crate::config::PoolSettings;
use crate::models::{AdditionalAgent, Agent, AgentCapability, AgentId, AgentLevel, RegularAgent, Session};

/// Handler invoked at every shift boundary.
pub type ShiftCallback = Arc<dyn Fn() + Send + Sync>;

/// Point-in-time view of one agent queue, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub kind: String,
    pub level: AgentLevel,
    pub working_hours: String,
    pub working: bool,
    pub available: bool,
    pub queue_size: usize,
    pub max_slots: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    queues: Vec<AgentQueue>,
    /// session id → index into `queues`
    assignments: HashMap<Uuid, usize>,
}

pub struct AllocationManager {
    state: Mutex<PoolState>,
    maximum_concurrency_per_agent: u32,
    clock: Arc<dyn Clock>,
    on_shift_changed: RwLock<Option<ShiftCallback>>,
}

impl AllocationManager {
    pub fn new(settings: &PoolSettings, clock: Arc<dyn Clock>) -> Self {
        Self::from_roster(
            settings.regular_agents.clone(),
            settings.additional_agents.clone(),
            settings.maximum_concurrency_per_agent,
            clock,
        )
    }

    /// Queues are laid out regular agents first, then additional agents, each
    /// in roster order.
    pub fn from_roster(
        regular_agents: Vec<RegularAgent>,
        additional_agents: Vec<AdditionalAgent>,
        maximum_concurrency_per_agent: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queues = regular_agents
            .into_iter()
            .map(Agent::from)
            .chain(additional_agents.into_iter().map(Agent::from))
            .map(|agent| AgentQueue::new(agent, maximum_concurrency_per_agent))
            .collect();

        Self {
            state: Mutex::new(PoolState {
                queues,
                assignments: HashMap::new(),
            }),
            maximum_concurrency_per_agent,
            clock,
            on_shift_changed: RwLock::new(None),
        }
    }

    /// Base capacity of the regular agents on shift right now, floored once
    /// over the whole sum.
    pub fn capacity(&self) -> usize {
        let now = self.clock.now();
        let state = self.state.lock();
        let scaled: u64 = state
            .queues
            .iter()
            .map(AgentQueue::agent)
            .filter(|agent| agent.is_regular() && agent.is_working_now(now))
            .map(|agent| {
                u64::from(self.maximum_concurrency_per_agent)
                    * u64::from(agent.level().efficiency_percent())
            })
            .sum();
        (scaled / 100) as usize
    }

    pub fn has_open_spots(&self) -> bool {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .queues
            .iter()
            .filter(|queue| queue.agent().is_available_to_chat(now))
            .map(AgentQueue::number_of_open_spots)
            .sum::<usize>()
            > 0
    }

    /// Returns `false` and leaves the session untouched when no agent can take
    /// it, or when the session is already allocated.
    pub fn allocate_session_to_agent(&self, session: Session) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.assignments.contains_key(&session.id) {
            tracing::warn!("Session {} is already allocated", session.id);
            return false;
        }

        let chosen = state
            .queues
            .iter()
            .enumerate()
            .filter(|(_, queue)| queue.agent().is_available_to_chat(now) && queue.has_open_spots())
            .min_by_key(|(_, queue)| (queue.agent().priority(), queue.queue_size()))
            .map(|(index, _)| index);

        let Some(index) = chosen else {
            tracing::debug!("No agent available for session {}", session.id);
            return false;
        };

        let session_id = session.id;
        let queue = &mut state.queues[index];
        queue.add_session(session);
        tracing::info!("Session {} was allocated to {}", session_id, queue.agent());
        state.assignments.insert(session_id, index);
        true
    }

    pub fn destroy_session(&self, session_id: &Uuid) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state.assignments.remove(session_id) else {
            return false;
        };

        let queue = &mut state.queues[index];
        queue.remove_session(session_id);
        tracing::info!("Session {} has been removed from {}", session_id, queue.agent());
        true
    }

    pub fn find_session_agent(&self, session_id: &Uuid) -> Option<Agent> {
        let state = self.state.lock();
        state
            .assignments
            .get(session_id)
            .map(|&index| state.queues[index].agent().clone())
    }

    /// Opens the first additional agent that is on shift but still closed.
    /// Returns whether one was opened.
    pub fn kick_additional_agent(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let opened = state
            .queues
            .iter_mut()
            .filter_map(|queue| queue.agent_mut().as_additional_mut())
            .find(|agent| agent.is_working_now(now) && !agent.is_open_to_chat());

        match opened {
            Some(agent) => {
                agent.make_open_to_chat();
                tracing::info!("{} opened to chat (overflow)", agent);
                true
            }
            None => {
                tracing::debug!("No additional agent left to open");
                false
            }
        }
    }

    /// Closes every additional agent. Sessions they already hold stay assigned.
    pub fn remove_additional_agents(&self) {
        let mut state = self.state.lock();
        let mut closed = 0usize;
        for agent in state
            .queues
            .iter_mut()
            .filter_map(|queue| queue.agent_mut().as_additional_mut())
        {
            if agent.is_open_to_chat() {
                closed += 1;
            }
            agent.make_close_to_chat();
        }
        if closed > 0 {
            tracing::info!("Closed {} additional agent(s)", closed);
        }
    }

    pub fn set_on_shift_changed_action<F>(&self, callback: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_shift_changed.write() = Some(Arc::new(callback));
        self
    }

    /// Runs the registered shift handler, if any. The lock is released before
    /// the handler executes so it may call back into this manager.
    pub fn notify_shift_changed(&self) {
        let callback = self.on_shift_changed.read().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Distinct, sorted times of day at which a regular agent starts or ends a
    /// shift.
    pub fn shift_boundaries(&self) -> Vec<NaiveTime> {
        let state = self.state.lock();
        state
            .queues
            .iter()
            .map(AgentQueue::agent)
            .filter(|agent| agent.is_regular())
            .flat_map(|agent| [agent.shift_start(), agent.shift_end()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn active_session_count(&self) -> usize {
        self.state.lock().assignments.len()
    }

    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .queues
            .iter()
            .map(|queue| {
                let agent = queue.agent();
                AgentSnapshot {
                    id: agent.id(),
                    kind: agent.kind().to_string(),
                    level: agent.level(),
                    working_hours: agent.working_hours(),
                    working: agent.is_working_now(now),
                    available: agent.is_available_to_chat(now),
                    queue_size: queue.queue_size(),
                    max_slots: queue.max_slots(),
                }
            })
            .collect()
    }
}
