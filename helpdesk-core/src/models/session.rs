use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A client support session: identity plus liveness timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: NaiveDateTime,
    pub last_touched_at: NaiveDateTime,
}

impl Session {
    pub fn new(id: Uuid, now: NaiveDateTime) -> Self {
        Self {
            id,
            created_at: now,
            last_touched_at: now,
        }
    }

    pub fn prolongate(&mut self, now: NaiveDateTime) {
        self.last_touched_at = now;
    }

    /// Expired once `timeout` has fully elapsed since the last touch.
    pub fn is_expired(&self, timeout: Duration, now: NaiveDateTime) -> bool {
        self.last_touched_at + timeout <= now
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
