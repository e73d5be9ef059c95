//! Session Store: FIFO backlog of sessions waiting for an agent.
//!
//! Admission control lives here. `create_session` refuses new sessions once the
//! backlog holds `maximum_queue_size` entries; callers surface that as "too
//! busy".
//!
//! Two removal paths exist and they differ on purpose:
//! - `pop_first_session_in_queue` hands a session over to allocation and stays
//!   silent
//! - `remove_session` / `remove_expired_sessions` are terminal and fire the
//!   on-removed notification
//!
//! Notifications always run after the backlog lock is released, so handlers may
//! call straight back into the store.

use chrono::Duration;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::Session;

pub type StoreCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Default)]
struct Backlog {
    order: VecDeque<Uuid>,
    sessions: HashMap<Uuid, Session>,
}

impl Backlog {
    fn detach(&mut self, session_id: &Uuid) -> Option<Session> {
        let session = self.sessions.remove(session_id)?;
        self.order.retain(|id| id != session_id);
        Some(session)
    }
}

pub struct SessionStore {
    backlog: Mutex<Backlog>,
    maximum_queue_size: AtomicUsize,
    clock: Arc<dyn Clock>,
    on_session_created: RwLock<Option<StoreCallback>>,
    on_session_removed: RwLock<Option<StoreCallback>>,
}

impl SessionStore {
    /// Starts with a zero admission threshold; the session manager pushes the
    /// real one as soon as it wires itself up.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            backlog: Mutex::new(Backlog::default()),
            maximum_queue_size: AtomicUsize::new(0),
            clock,
            on_session_created: RwLock::new(None),
            on_session_removed: RwLock::new(None),
        }
    }

    pub fn set_on_session_created<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_session_created.write() = Some(Arc::new(callback));
    }

    pub fn set_on_session_removed<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_session_removed.write() = Some(Arc::new(callback));
    }

    /// `None` when the backlog is already at its maximum size.
    pub fn create_session(&self) -> Option<Session> {
        let session = {
            let mut backlog = self.backlog.lock();
            let limit = self.maximum_queue_size();
            if backlog.order.len() >= limit {
                tracing::warn!(
                    "Session rejected: backlog full ({}/{})",
                    backlog.order.len(),
                    limit
                );
                return None;
            }

            let session = Session::new(Uuid::new_v4(), self.clock.now());
            backlog.order.push_back(session.id);
            backlog.sessions.insert(session.id, session.clone());
            session
        };

        fire(&self.on_session_created);
        Some(session)
    }

    /// Dequeues the oldest waiting session without firing on-removed.
    pub fn pop_first_session_in_queue(&self) -> Option<Session> {
        let mut backlog = self.backlog.lock();
        let id = backlog.order.pop_front()?;
        backlog.sessions.remove(&id)
    }

    /// Puts a session popped by [`pop_first_session_in_queue`] back at the head
    /// of the backlog. Silent, and ignores the admission threshold since the
    /// session was already admitted.
    ///
    /// [`pop_first_session_in_queue`]: SessionStore::pop_first_session_in_queue
    pub fn restore_front(&self, session: Session) {
        let mut backlog = self.backlog.lock();
        if backlog.sessions.contains_key(&session.id) {
            return;
        }
        backlog.order.push_front(session.id);
        backlog.sessions.insert(session.id, session);
    }

    pub fn prolongate_session(&self, session_id: &Uuid) -> bool {
        let now = self.clock.now();
        let mut backlog = self.backlog.lock();
        match backlog.sessions.get_mut(session_id) {
            Some(session) => {
                session.prolongate(now);
                true
            }
            None => false,
        }
    }

    pub fn remove_session(&self, session_id: &Uuid) -> bool {
        let removed = self.backlog.lock().detach(session_id).is_some();
        if removed {
            fire(&self.on_session_removed);
        }
        removed
    }

    /// Drops every backlog session idle for at least `timeout` in one pass.
    /// On-removed fires once if anything went.
    pub fn remove_expired_sessions(&self, timeout: Duration) -> bool {
        let now = self.clock.now();
        let expired = {
            let mut backlog = self.backlog.lock();
            let expired: Vec<Uuid> = backlog
                .order
                .iter()
                .filter(|id| {
                    backlog
                        .sessions
                        .get(*id)
                        .is_some_and(|session| session.is_expired(timeout, now))
                })
                .copied()
                .collect();
            for id in &expired {
                backlog.sessions.remove(id);
            }
            if !expired.is_empty() {
                backlog.order.retain(|id| !expired.contains(id));
            }
            expired
        };

        if expired.is_empty() {
            return false;
        }
        tracing::info!("Removed {} expired session(s) from the backlog", expired.len());
        fire(&self.on_session_removed);
        true
    }

    pub fn set_maximum_queue_size(&self, maximum_queue_size: usize) {
        self.maximum_queue_size.store(maximum_queue_size, Ordering::SeqCst);
    }

    pub fn maximum_queue_size(&self) -> usize {
        self.maximum_queue_size.load(Ordering::SeqCst)
    }

    pub fn get_queue_size(&self) -> usize {
        self.backlog.lock().order.len()
    }

    pub fn contains(&self, session_id: &Uuid) -> bool {
        self.backlog.lock().sessions.contains_key(session_id)
    }
}

fn fire(slot: &RwLock<Option<StoreCallback>>) {
    let callback = slot.read().clone();
    if let Some(callback) = callback {
        callback();
    }
}
