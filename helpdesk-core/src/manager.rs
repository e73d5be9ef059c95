//! Session Manager: wires the Session Store to the Allocation Manager.
//!
//! Sessions enter through the store's backlog and move to agent queues when a
//! drain finds open slots. Drains run on every create, on each 1-second
//! expiration sweep, and at shift boundaries.
//!
//! Elastic capacity uses hysteresis on the backlog length:
//! - backlog reaches `maximum_queue_size` → open one additional agent
//! - backlog drops below `capacity` → close every additional agent
//!
//! All store/allocation callbacks hold `Weak` references to the shared state,
//! and the background tasks are owned here and joined on [`SessionManager::shutdown`].

use chrono::Duration;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::allocation::{AgentSnapshot, AllocationManager};
use crate::clock::Clock;
use crate::config::PoolSettings;
use crate::models::{Agent, Session};
use crate::scheduler::{ShiftAction, ShiftScheduler};
use crate::store::SessionStore;

const SWEEP_PERIOD: std::time::Duration = std::time::Duration::from_secs(1);

/// Pool-wide counters plus one entry per agent.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub capacity: usize,
    pub maximum_queue_size: usize,
    pub queue_size: usize,
    pub active_sessions: usize,
    pub agents: Vec<AgentSnapshot>,
}

struct ManagerInner {
    store: SessionStore,
    allocation: AllocationManager,
    /// Sessions handed to an agent, kept for prolongation and expiry.
    allocated: Mutex<HashMap<Uuid, Session>>,
    session_timeout: Duration,
    clock: Arc<dyn Clock>,
    drain_lock: Mutex<()>,
}

struct BackgroundTasks {
    cancel: CancellationToken,
    sweep: JoinHandle<()>,
    scheduler: ShiftScheduler,
}

pub struct SessionManager {
    inner: Arc<ManagerInner>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl SessionManager {
    /// Builds the engine without spawning anything. Call [`start`] from inside
    /// a tokio runtime to run the sweep and the shift scheduler.
    ///
    /// [`start`]: SessionManager::start
    pub fn new(settings: &PoolSettings, clock: Arc<dyn Clock>) -> Self {
        let inner = Arc::new(ManagerInner {
            store: SessionStore::new(clock.clone()),
            allocation: AllocationManager::new(settings, clock.clone()),
            allocated: Mutex::new(HashMap::new()),
            session_timeout: settings.session_timeout,
            clock,
            drain_lock: Mutex::new(()),
        });

        let weak = Arc::downgrade(&inner);
        inner.allocation.set_on_shift_changed_action(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_shift_changed();
            }
        });

        inner.store.set_maximum_queue_size(inner.maximum_queue_size());

        let weak = Arc::downgrade(&inner);
        inner.store.set_on_session_created(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_session_created();
            }
        });

        let weak = Arc::downgrade(&inner);
        inner.store.set_on_session_removed(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_session_removed();
            }
        });

        tracing::info!(
            "Session manager ready: capacity={}, max queue={}, timeout={}s",
            inner.capacity(),
            inner.maximum_queue_size(),
            inner.session_timeout.num_seconds()
        );

        Self {
            inner,
            tasks: Mutex::new(None),
        }
    }

    /// `new` followed by `start`.
    pub fn launch(settings: &PoolSettings, clock: Arc<dyn Clock>) -> Self {
        let manager = Self::new(settings, clock);
        manager.start();
        manager
    }

    /// Spawns the expiration sweep and the shift scheduler. A second call while
    /// they are running does nothing.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            tracing::warn!("Session manager already started");
            return;
        }

        let cancel = CancellationToken::new();
        let sweep = tokio::spawn(run_expiration_loop(
            Arc::downgrade(&self.inner),
            cancel.clone(),
        ));

        let weak = Arc::downgrade(&self.inner);
        let action: ShiftAction = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.allocation.notify_shift_changed();
            }
        });
        let scheduler = ShiftScheduler::spawn(
            action,
            self.inner.allocation.shift_boundaries(),
            self.inner.clock.clone(),
            cancel.clone(),
        );

        *tasks = Some(BackgroundTasks {
            cancel,
            sweep,
            scheduler,
        });
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().is_some()
    }

    /// Stops both background tasks and waits for them to finish.
    pub async fn shutdown(&self) {
        let tasks = self.tasks.lock().take();
        let Some(tasks) = tasks else {
            return;
        };

        tasks.cancel.cancel();
        if let Err(e) = tasks.sweep.await {
            tracing::warn!("Expiration sweep ended abnormally: {}", e);
        }
        tasks.scheduler.shutdown().await;
        tracing::info!("Session manager stopped");
    }

    /// `None` means the backlog is full ("too busy").
    pub fn create_session(&self) -> Option<Uuid> {
        self.inner.create_session()
    }

    pub fn prolongate_session(&self, session_id: &Uuid) -> bool {
        self.inner.prolongate_session(session_id)
    }

    pub fn destroy_session(&self, session_id: &Uuid) -> bool {
        self.inner.destroy_session(session_id)
    }

    pub fn allocate_session_to_agent(&self, session: Session) -> bool {
        self.inner.allocate_session_to_agent(session)
    }

    pub fn find_session_agent(&self, session_id: &Uuid) -> Option<Agent> {
        self.inner.allocation.find_session_agent(session_id)
    }

    /// One pass of the periodic sweep: backlog expiry, allocated expiry, drain.
    pub fn run_expiration_sweep(&self) {
        self.inner.run_expiration_sweep();
    }

    pub fn drain_backlog(&self) -> usize {
        self.inner.drain_backlog()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn maximum_queue_size(&self) -> usize {
        self.inner.maximum_queue_size()
    }

    pub fn queue_size(&self) -> usize {
        self.inner.store.get_queue_size()
    }

    pub fn active_session_count(&self) -> usize {
        self.inner.allocated.lock().len()
    }

    pub fn session_timeout(&self) -> Duration {
        self.inner.session_timeout
    }

    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            capacity: self.capacity(),
            maximum_queue_size: self.maximum_queue_size(),
            queue_size: self.queue_size(),
            active_sessions: self.active_session_count(),
            agents: self.inner.allocation.snapshot(),
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.get_mut().as_ref() {
            tasks.cancel.cancel();
        }
    }
}

impl ManagerInner {
    fn capacity(&self) -> usize {
        self.allocation.capacity()
    }

    /// `floor(capacity * 1.5)`
    fn maximum_queue_size(&self) -> usize {
        self.capacity() * 3 / 2
    }

    fn create_session(&self) -> Option<Uuid> {
        tracing::info!("Requested creating a new session");
        let session = self.store.create_session()?;
        tracing::info!("The new session {} has been created", session.id);
        Some(session.id)
    }

    fn prolongate_session(&self, session_id: &Uuid) -> bool {
        // held across the backlog lookup so a drain cannot move the session
        // between the two checks
        let mut allocated = self.allocated.lock();
        if self.store.prolongate_session(session_id) {
            tracing::info!("Session {} prolongated (queued)", session_id);
            return true;
        }

        match allocated.get_mut(session_id) {
            Some(session) => {
                session.prolongate(self.clock.now());
                tracing::info!("Session {} prolongated", session_id);
                true
            }
            None => false,
        }
    }

    fn allocate_session_to_agent(&self, session: Session) -> bool {
        let mut allocated = self.allocated.lock();
        if self.store.contains(&session.id) {
            tracing::warn!("Session {} is still queued; not allocating", session.id);
            return false;
        }
        self.allocate_tracked(&mut allocated, session)
    }

    /// Assigns `session` to an agent and records it. The caller holds the
    /// `allocated` guard for the whole handoff.
    fn allocate_tracked(&self, allocated: &mut HashMap<Uuid, Session>, session: Session) -> bool {
        if allocated.contains_key(&session.id) {
            return false;
        }
        let tracked = session.clone();
        if !self.allocation.allocate_session_to_agent(session) {
            return false;
        }
        allocated.insert(tracked.id, tracked);
        true
    }

    fn destroy_session(&self, session_id: &Uuid) -> bool {
        if self.store.remove_session(session_id) {
            tracing::info!("Session {} has been deleted (queued)", session_id);
            return true;
        }

        {
            let mut allocated = self.allocated.lock();
            if allocated.remove(session_id).is_some() {
                let released = self.allocation.destroy_session(session_id);
                if released {
                    tracing::info!("Session {} has been deleted", session_id);
                }
                return released;
            }
        }

        // a drain that lost its slot may have put the session back
        if self.store.remove_session(session_id) {
            tracing::info!("Session {} has been deleted (queued)", session_id);
            return true;
        }
        false
    }

    fn run_expiration_sweep(&self) {
        self.store.remove_expired_sessions(self.session_timeout);

        let now = self.clock.now();
        let expired: Vec<Uuid> = {
            let mut allocated = self.allocated.lock();
            let expired: Vec<Uuid> = allocated
                .values()
                .filter(|session| session.is_expired(self.session_timeout, now))
                .map(|session| session.id)
                .collect();
            for session_id in &expired {
                allocated.remove(session_id);
                self.allocation.destroy_session(session_id);
                tracing::info!("Session {} expired", session_id);
            }
            expired
        };

        let moved = self.drain_backlog();
        tracing::debug!(
            "Sweep: {} allocated expired, {} drained, backlog {}",
            expired.len(),
            moved,
            self.store.get_queue_size()
        );
    }

    /// Moves backlog sessions into open agent slots. Returns how many moved.
    fn drain_backlog(&self) -> usize {
        let _drain = self.drain_lock.lock();
        let mut moved = 0;
        loop {
            // pop and insert under one guard so the session is always visible
            // to prolong and destroy
            let mut allocated = self.allocated.lock();
            if !self.allocation.has_open_spots() {
                break;
            }
            let Some(session) = self.store.pop_first_session_in_queue() else {
                break;
            };
            if !self.allocate_tracked(&mut allocated, session.clone()) {
                tracing::warn!("Lost the slot for session {}; returned to backlog", session.id);
                self.store.restore_front(session);
                break;
            }
            moved += 1;
        }
        moved
    }

    fn on_session_created(&self) {
        if self.store.get_queue_size() >= self.maximum_queue_size() {
            self.allocation.kick_additional_agent();
        }
        self.drain_backlog();
    }

    fn on_session_removed(&self) {
        if self.store.get_queue_size() < self.capacity() {
            self.allocation.remove_additional_agents();
        }
    }

    fn on_shift_changed(&self) {
        let queue_size = self.store.get_queue_size();
        let maximum_queue_size = self.maximum_queue_size();
        if queue_size >= maximum_queue_size {
            self.allocation.kick_additional_agent();
        } else if queue_size < self.capacity() {
            self.allocation.remove_additional_agents();
        }

        self.store.set_maximum_queue_size(maximum_queue_size);
        tracing::info!(
            "Shift changed: capacity={}, max queue={}, backlog={}",
            self.capacity(),
            maximum_queue_size,
            queue_size
        );
        self.drain_backlog();
    }
}

async fn run_expiration_loop(inner: Weak<ManagerInner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!("Expiration sweep started (period: {}s)", SWEEP_PERIOD.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.run_expiration_sweep();
            }
            _ = cancel.cancelled() => {
                tracing::info!("Expiration sweep shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::tests::{roster, time};
    use crate::clock::{ManualClock, TokioClock};
    use crate::models::AgentCapability;
    use std::sync::Barrier;
    use std::thread;

    fn settings() -> PoolSettings {
        let (regular_agents, additional_agents) = roster();
        PoolSettings {
            maximum_concurrency_per_agent: 10,
            session_timeout: Duration::seconds(3),
            regular_agents,
            additional_agents,
        }
    }

    fn manager_at(hour: u32, minute: u32) -> (SessionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(hour, minute).unwrap());
        (SessionManager::new(&settings(), clock.clone()), clock)
    }

    fn agent_of(manager: &SessionManager, id: &Uuid) -> Option<u32> {
        manager.find_session_agent(id).map(|agent| agent.id())
    }

    fn open_additional(manager: &SessionManager) -> Vec<u32> {
        manager
            .status()
            .agents
            .into_iter()
            .filter(|a| a.kind == "additional" && a.available)
            .map(|a| a.id)
            .collect()
    }

    // ========================================================================
    // TEST 1: capacity and queue bound per shift
    // ========================================================================
    #[test]
    fn test_capacity_per_shift() {
        for (hour, capacity, max) in [(10, 12, 18), (18, 9, 13), (0, 12, 18)] {
            let (manager, _clock) = manager_at(hour, 0);
            assert_eq!(manager.capacity(), capacity, "capacity at {hour}:00");
            assert_eq!(manager.maximum_queue_size(), max, "max queue at {hour}:00");
            assert_eq!(manager.inner.store.maximum_queue_size(), max);
        }
    }

    // ========================================================================
    // TEST 2: create allocates straight away while slots are open
    // ========================================================================
    #[test]
    fn test_create_session_is_allocated() {
        let (manager, _clock) = manager_at(10, 0);

        let id = manager.create_session().expect("pool has room");
        assert_eq!(agent_of(&manager, &id), Some(10));
        assert_eq!(manager.queue_size(), 0);
        assert_eq!(manager.active_session_count(), 1);
    }

    #[test]
    fn test_allocations_follow_tiers() {
        for (hour, expected) in [
            (10, [10u32, 10, 10, 10, 11, 11]),
            (18, [12, 12, 12, 12, 13, 13]),
            (0, [14, 15, 14, 15, 14, 15]),
        ] {
            let (manager, clock) = manager_at(hour, 0);
            let sessions: Vec<Session> =
                (0..6).map(|_| Session::new(Uuid::new_v4(), clock.now())).collect();
            for s in &sessions {
                assert!(manager.allocate_session_to_agent(s.clone()));
            }
            let agents: Vec<Option<u32>> = sessions.iter().map(|s| agent_of(&manager, &s.id)).collect();
            assert_eq!(agents, expected.map(Some).to_vec(), "allocations at {hour}:00");
        }
    }

    #[test]
    fn test_failed_allocation_rolls_back() {
        let (manager, clock) = manager_at(18, 0);
        for _ in 0..9 {
            assert!(manager.allocate_session_to_agent(Session::new(Uuid::new_v4(), clock.now())));
        }

        let extra = Session::new(Uuid::new_v4(), clock.now());
        assert!(!manager.allocate_session_to_agent(extra.clone()));
        assert_eq!(manager.active_session_count(), 9);
        assert!(!manager.prolongate_session(&extra.id));
    }

    // ========================================================================
    // TEST 3: admission control and overflow
    // ========================================================================
    #[test]
    fn test_too_busy_when_backlog_full() {
        // 18:00: 9 slots, max queue 13, additional agents off shift
        let (manager, _clock) = manager_at(18, 0);

        for _ in 0..22 {
            assert!(manager.create_session().is_some());
        }
        assert_eq!(manager.active_session_count(), 9);
        assert_eq!(manager.queue_size(), 13);

        assert!(manager.create_session().is_none());
        assert!(open_additional(&manager).is_empty());
    }

    #[test]
    fn test_backlog_at_max_kicks_additional_agent() {
        let (manager, _clock) = manager_at(10, 0);

        for _ in 0..29 {
            assert!(manager.create_session().is_some());
        }
        assert_eq!(manager.active_session_count(), 12);
        assert_eq!(manager.queue_size(), 17);
        assert!(open_additional(&manager).is_empty());

        // 18th backlog entry reaches the bound
        assert!(manager.create_session().is_some());
        assert_eq!(open_additional(&manager), vec![100]);
        assert_eq!(manager.active_session_count(), 16);
        assert_eq!(manager.queue_size(), 14);

        for _ in 0..4 {
            manager.create_session();
        }
        assert_eq!(open_additional(&manager), vec![100, 101]);
        assert_eq!(manager.queue_size(), 14);
    }

    #[test]
    fn test_backlog_below_capacity_retracts_additional_agents() {
        let (manager, _clock) = manager_at(10, 0);
        let ids: Vec<Uuid> = (0..30).filter_map(|_| manager.create_session()).collect();
        assert_eq!(open_additional(&manager), vec![100]);

        let queued: Vec<Uuid> = ids
            .iter()
            .copied()
            .filter(|id| manager.inner.store.contains(id))
            .collect();
        assert_eq!(queued.len(), 14);

        // 14 → 12: still at capacity
        assert!(manager.destroy_session(&queued[0]));
        assert!(manager.destroy_session(&queued[1]));
        assert_eq!(open_additional(&manager), vec![100]);

        // 11 < 12
        assert!(manager.destroy_session(&queued[2]));
        assert!(open_additional(&manager).is_empty());

        // sessions already on agent 100 stay there
        assert_eq!(
            manager.status().agents.iter().find(|a| a.id == 100).map(|a| a.queue_size),
            Some(4)
        );
    }

    // ========================================================================
    // TEST 4: prolong / destroy resolve against backlog then allocated set
    // ========================================================================
    #[test]
    fn test_prolongate_unknown_session_fails() {
        let (manager, _clock) = manager_at(10, 0);
        assert!(!manager.prolongate_session(&Uuid::new_v4()));
    }

    #[test]
    fn test_prolongate_allocated_and_queued() {
        let (manager, _clock) = manager_at(18, 0);
        let ids: Vec<Uuid> = (0..10).filter_map(|_| manager.create_session()).collect();

        assert!(manager.find_session_agent(&ids[0]).is_some());
        assert!(manager.prolongate_session(&ids[0]));

        assert!(manager.inner.store.contains(&ids[9]));
        assert!(manager.prolongate_session(&ids[9]));
    }

    #[test]
    fn test_destroy_allocated_session() {
        let (manager, clock) = manager_at(10, 0);
        let session = Session::new(Uuid::new_v4(), clock.now());
        manager.allocate_session_to_agent(session.clone());
        assert!(manager.find_session_agent(&session.id).is_some());

        assert!(manager.destroy_session(&session.id));
        assert!(manager.find_session_agent(&session.id).is_none());
        assert_eq!(manager.active_session_count(), 0);
        assert!(!manager.destroy_session(&session.id));
    }

    #[test]
    fn test_queued_session_cannot_be_allocated_directly() {
        let (manager, clock) = manager_at(18, 0);
        let ids: Vec<Uuid> = (0..10).filter_map(|_| manager.create_session()).collect();
        let queued = Session::new(ids[9], clock.now());

        assert!(!manager.allocate_session_to_agent(queued));
        assert!(manager.inner.store.contains(&ids[9]));
        assert!(manager.find_session_agent(&ids[9]).is_none());
        assert_eq!(manager.active_session_count(), 9);
    }

    #[test]
    fn test_destroy_queued_session() {
        let (manager, _clock) = manager_at(18, 0);
        let ids: Vec<Uuid> = (0..10).filter_map(|_| manager.create_session()).collect();

        assert!(manager.destroy_session(&ids[9]));
        assert_eq!(manager.queue_size(), 0);
        assert_eq!(manager.active_session_count(), 9);
    }

    // ========================================================================
    // TEST 5: expiration sweep
    // ========================================================================
    #[test]
    fn test_sweep_expires_idle_sessions() {
        let (manager, clock) = manager_at(18, 0);
        let ids: Vec<Uuid> = (0..11).filter_map(|_| manager.create_session()).collect();
        assert_eq!(manager.active_session_count(), 9);
        assert_eq!(manager.queue_size(), 2);

        clock.advance(Duration::seconds(2));
        assert!(manager.prolongate_session(&ids[0]));
        assert!(manager.prolongate_session(&ids[10]));

        clock.advance(Duration::seconds(1));
        manager.run_expiration_sweep();

        // ids[0] survives on its agent, ids[10] survives and drains into a
        // freed slot, the rest are gone
        assert_eq!(manager.queue_size(), 0);
        assert_eq!(manager.active_session_count(), 2);
        assert!(manager.find_session_agent(&ids[0]).is_some());
        assert!(manager.find_session_agent(&ids[10]).is_some());
        assert!(manager.find_session_agent(&ids[1]).is_none());
    }

    #[test]
    fn test_sweep_drains_freed_slots() {
        let (manager, _clock) = manager_at(18, 0);
        let ids: Vec<Uuid> = (0..11).filter_map(|_| manager.create_session()).collect();
        assert_eq!(manager.queue_size(), 2);

        assert!(manager.destroy_session(&ids[0]));
        assert_eq!(manager.queue_size(), 2, "destroy alone does not drain");

        manager.run_expiration_sweep();
        assert_eq!(manager.queue_size(), 1);
        assert!(manager.find_session_agent(&ids[9]).is_some());
        assert!(manager.inner.store.contains(&ids[10]));
    }

    // ========================================================================
    // TEST 6: shift change recomputes the queue bound and drains
    // ========================================================================
    #[test]
    fn test_shift_change_moves_backlog_to_new_shift() {
        let (manager, clock) = manager_at(14, 0);
        for _ in 0..17 {
            manager.create_session();
        }
        assert_eq!(manager.active_session_count(), 12);
        assert_eq!(manager.queue_size(), 5);

        clock.set(ManualClock::at(15, 0).unwrap().now());
        manager.inner.allocation.notify_shift_changed();

        assert_eq!(manager.inner.store.maximum_queue_size(), 13);
        assert_eq!(manager.queue_size(), 0);
        assert_eq!(manager.active_session_count(), 17);
        assert!(manager.status().agents.iter().any(|a| a.id == 13 && a.queue_size == 1));
    }

    #[test]
    fn test_shift_boundaries_feed_scheduler() {
        let (manager, _clock) = manager_at(10, 0);
        assert_eq!(
            manager.inner.allocation.shift_boundaries(),
            vec![time(7), time(15), time(23)]
        );
    }

    // ========================================================================
    // TEST 7: background tasks
    // ========================================================================
    fn tokio_clock(hour: u32) -> Arc<TokioClock> {
        Arc::new(TokioClock::starting_at(ManualClock::at(hour, 0).unwrap().now()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_expires_session() {
        let manager = SessionManager::launch(&settings(), tokio_clock(10));
        let id = manager.create_session().unwrap();
        assert!(manager.find_session_agent(&id).is_some());

        tokio::time::sleep(std::time::Duration::from_millis(4500)).await;

        assert!(manager.find_session_agent(&id).is_none());
        assert_eq!(manager.active_session_count(), 0);
        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_prevents_expiry() {
        let manager = SessionManager::launch(&settings(), tokio_clock(10));
        let id = manager.create_session().unwrap();

        for _ in 0..6 {
            tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
            assert!(manager.prolongate_session(&id));
        }

        assert!(manager.find_session_agent(&id).is_some());
        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_applies_shift_change() {
        let manager = SessionManager::launch(&settings(), tokio_clock(14));
        assert_eq!(manager.inner.store.maximum_queue_size(), 18);

        // past 15:00
        tokio::time::sleep(std::time::Duration::from_secs(3700)).await;
        assert_eq!(manager.inner.store.maximum_queue_size(), 13);

        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_joins_tasks() {
        let manager = SessionManager::launch(&settings(), tokio_clock(10));
        assert!(manager.is_running());

        manager.shutdown().await;
        assert!(!manager.is_running());

        // second shutdown is a no-op
        manager.shutdown().await;
    }

    // ========================================================================
    // TEST 8: concurrent callers keep the pool consistent
    // ========================================================================
    /// Every session lives in exactly one place: the backlog, or an agent queue
    /// plus the allocated map.
    fn assert_consistent(manager: &SessionManager, ids: &[Uuid]) {
        let status = manager.status();
        let queued: usize = status.agents.iter().map(|a| a.queue_size).sum();
        assert_eq!(queued, manager.active_session_count());

        let allocated = manager.inner.allocated.lock();
        for id in ids {
            let on_agent = manager.find_session_agent(id).is_some();
            assert_eq!(on_agent, allocated.contains_key(id), "session {id} tracked in one place only");
            assert!(!(on_agent && manager.inner.store.contains(id)), "session {id} both queued and allocated");
        }
    }

    /// 18:00 pool (9 slots) full, one queued session, one slot freed without
    /// draining. The queued session is returned.
    fn pool_with_freed_slot() -> (Arc<SessionManager>, Uuid) {
        let (manager, _clock) = manager_at(18, 0);
        let ids: Vec<Uuid> = (0..10).filter_map(|_| manager.create_session()).collect();
        assert!(manager.destroy_session(&ids[0]));
        assert!(manager.inner.store.contains(&ids[9]));
        (Arc::new(manager), ids[9])
    }

    #[test]
    fn test_destroy_racing_drain_never_strands_a_slot() {
        for _ in 0..200 {
            let (manager, queued) = pool_with_freed_slot();
            let barrier = Arc::new(Barrier::new(2));

            let drainer = {
                let (manager, barrier) = (manager.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    manager.drain_backlog();
                })
            };
            barrier.wait();
            let destroyed = manager.destroy_session(&queued);
            drainer.join().unwrap();

            assert!(destroyed, "a live session is always destroyable");
            assert!(manager.find_session_agent(&queued).is_none());
            assert!(!manager.inner.store.contains(&queued));
            assert_eq!(manager.active_session_count(), 8);
            assert_consistent(&manager, &[queued]);
        }
    }

    #[test]
    fn test_prolong_racing_drain_always_finds_session() {
        for _ in 0..200 {
            let (manager, queued) = pool_with_freed_slot();
            let barrier = Arc::new(Barrier::new(2));

            let drainer = {
                let (manager, barrier) = (manager.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    manager.drain_backlog();
                })
            };
            barrier.wait();
            let prolongated = manager.prolongate_session(&queued);
            drainer.join().unwrap();

            assert!(prolongated, "session was moving between backlog and agent");
            assert!(manager.find_session_agent(&queued).is_some());
            assert_consistent(&manager, &[queued]);
        }
    }

    #[test]
    fn test_concurrent_traffic_keeps_invariants() {
        let (manager, clock) = manager_at(10, 0);
        let manager = Arc::new(manager);
        let created = Arc::new(Mutex::new(Vec::<Uuid>::new()));
        let barrier = Arc::new(Barrier::new(6));

        let mut workers = Vec::new();
        for _ in 0..2 {
            let (manager, created, barrier) = (manager.clone(), created.clone(), barrier.clone());
            workers.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..200 {
                    if let Some(id) = manager.create_session() {
                        created.lock().push(id);
                    }
                }
            }));
        }
        {
            let (manager, created, barrier) = (manager.clone(), created.clone(), barrier.clone());
            workers.push(thread::spawn(move || {
                barrier.wait();
                for i in 0..300 {
                    let target = created.lock().get(i * 7 % 50).copied();
                    if let Some(id) = target {
                        manager.destroy_session(&id);
                    }
                }
            }));
        }
        {
            let (manager, created, barrier) = (manager.clone(), created.clone(), barrier.clone());
            workers.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..300 {
                    let recent: Vec<Uuid> = created.lock().iter().rev().take(5).copied().collect();
                    for id in &recent {
                        manager.prolongate_session(id);
                    }
                }
            }));
        }
        {
            let (manager, clock, barrier) = (manager.clone(), clock.clone(), barrier.clone());
            workers.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..100 {
                    clock.advance(Duration::milliseconds(100));
                    manager.run_expiration_sweep();
                }
            }));
        }

        barrier.wait();
        for worker in workers {
            worker.join().unwrap();
        }

        let ids = created.lock().clone();
        assert!(!ids.is_empty());
        assert_consistent(&manager, &ids);
        assert!(manager.queue_size() <= manager.inner.store.maximum_queue_size());

        // quiesced: a final sweep leaves no open slot next to a waiting session
        manager.run_expiration_sweep();
        assert!(manager.queue_size() == 0 || !manager.inner.allocation.has_open_spots());
        assert_consistent(&manager, &ids);
    }
}
