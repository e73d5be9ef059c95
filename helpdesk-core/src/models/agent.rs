//! Support agents and their working-shift windows.
//!
//! Two closed variants exist: [`RegularAgent`] (rostered, always contributes to
//! base capacity while on shift) and [`AdditionalAgent`] (elastic overflow
//! worker, only takes chats once the allocation manager opens it).

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type AgentId = u32;

/// Seniority level. Declaration order is the dispatch priority ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentLevel {
    Junior,
    Middle,
    Senior,
    TeamLead,
}

impl AgentLevel {
    /// Share of one concurrency unit, in whole percent. TeamLead < Senior.
    pub fn efficiency_percent(self) -> u32 {
        match self {
            AgentLevel::Middle => 60,
            AgentLevel::Senior => 80,
            AgentLevel::TeamLead => 50,
            AgentLevel::Junior => 40,
        }
    }

    pub fn efficiency(self) -> f64 {
        f64::from(self.efficiency_percent()) / 100.0
    }

    pub fn priority(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AgentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentLevel::Junior => "Junior",
            AgentLevel::Middle => "Middle",
            AgentLevel::Senior => "Senior",
            AgentLevel::TeamLead => "TeamLead",
        };
        f.write_str(name)
    }
}

/// True iff `time` lies in the cyclic window `[start, end)` on a 24h clock.
pub fn within_shift(time: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        start <= time && time < end
    } else {
        time >= start || time < end
    }
}

// ============================================================================
// Capability interface
// ============================================================================

/// Behaviour shared by every agent variant.
pub trait AgentCapability {
    fn id(&self) -> AgentId;
    fn level(&self) -> AgentLevel;
    fn shift_start(&self) -> NaiveTime;
    fn shift_end(&self) -> NaiveTime;
    fn is_available_to_chat(&self, now: NaiveDateTime) -> bool;

    fn efficiency(&self) -> f64 {
        self.level().efficiency()
    }

    fn priority(&self) -> u8 {
        self.level().priority()
    }

    fn is_working_now(&self, now: NaiveDateTime) -> bool {
        within_shift(now.time(), self.shift_start(), self.shift_end())
    }

    fn working_hours(&self) -> String {
        format!(
            "{}-{}",
            self.shift_start().format("%H:%M"),
            self.shift_end().format("%H:%M")
        )
    }
}

// ============================================================================
// Variants
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularAgent {
    id: AgentId,
    level: AgentLevel,
    shift_start: NaiveTime,
    shift_end: NaiveTime,
    team: String,
}

impl RegularAgent {
    /// The shift end wraps past midnight when `start + duration` does.
    pub fn new(
        id: AgentId,
        shift_start: NaiveTime,
        shift_duration: Duration,
        level: AgentLevel,
        team: impl Into<String>,
    ) -> Self {
        let (shift_end, _) = shift_start.overflowing_add_signed(shift_duration);
        Self {
            id,
            level,
            shift_start,
            shift_end,
            team: team.into(),
        }
    }

    pub fn team(&self) -> &str {
        &self.team
    }
}

impl AgentCapability for RegularAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn level(&self) -> AgentLevel {
        self.level
    }

    fn shift_start(&self) -> NaiveTime {
        self.shift_start
    }

    fn shift_end(&self) -> NaiveTime {
        self.shift_end
    }

    fn is_available_to_chat(&self, now: NaiveDateTime) -> bool {
        self.is_working_now(now)
    }
}

impl fmt::Display for RegularAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Agent {} (level {}, team {})", self.id, self.level, self.team)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalAgent {
    id: AgentId,
    shift_start: NaiveTime,
    shift_end: NaiveTime,
    open_to_chat: bool,
}

impl AdditionalAgent {
    pub fn new(id: AgentId, shift_start: NaiveTime, shift_end: NaiveTime) -> Self {
        Self {
            id,
            shift_start,
            shift_end,
            open_to_chat: false,
        }
    }

    pub fn is_open_to_chat(&self) -> bool {
        self.open_to_chat
    }

    pub(crate) fn make_open_to_chat(&mut self) {
        self.open_to_chat = true;
    }

    pub(crate) fn make_close_to_chat(&mut self) {
        self.open_to_chat = false;
    }
}

impl AgentCapability for AdditionalAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn level(&self) -> AgentLevel {
        AgentLevel::Junior
    }

    fn shift_start(&self) -> NaiveTime {
        self.shift_start
    }

    fn shift_end(&self) -> NaiveTime {
        self.shift_end
    }

    fn is_available_to_chat(&self, now: NaiveDateTime) -> bool {
        self.is_working_now(now) && self.open_to_chat
    }
}

impl fmt::Display for AdditionalAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Additional agent {}", self.id)
    }
}

/// Closed set of agent variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Agent {
    Regular(RegularAgent),
    Additional(AdditionalAgent),
}

impl Agent {
    pub fn is_regular(&self) -> bool {
        matches!(self, Agent::Regular(_))
    }

    pub fn as_additional_mut(&mut self) -> Option<&mut AdditionalAgent> {
        match self {
            Agent::Additional(agent) => Some(agent),
            Agent::Regular(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Agent::Regular(_) => "regular",
            Agent::Additional(_) => "additional",
        }
    }
}

impl AgentCapability for Agent {
    fn id(&self) -> AgentId {
        match self {
            Agent::Regular(a) => a.id(),
            Agent::Additional(a) => a.id(),
        }
    }

    fn level(&self) -> AgentLevel {
        match self {
            Agent::Regular(a) => a.level(),
            Agent::Additional(a) => a.level(),
        }
    }

    fn shift_start(&self) -> NaiveTime {
        match self {
            Agent::Regular(a) => a.shift_start(),
            Agent::Additional(a) => a.shift_start(),
        }
    }

    fn shift_end(&self) -> NaiveTime {
        match self {
            Agent::Regular(a) => a.shift_end(),
            Agent::Additional(a) => a.shift_end(),
        }
    }

    fn is_available_to_chat(&self, now: NaiveDateTime) -> bool {
        match self {
            Agent::Regular(a) => a.is_available_to_chat(now),
            Agent::Additional(a) => a.is_available_to_chat(now),
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Agent::Regular(a) => fmt::Display::fmt(a, f),
            Agent::Additional(a) => fmt::Display::fmt(a, f),
        }
    }
}

impl From<RegularAgent> for Agent {
    fn from(agent: RegularAgent) -> Self {
        Agent::Regular(agent)
    }
}

impl From<AdditionalAgent> for Agent {
    fn from(agent: AdditionalAgent) -> Self {
        Agent::Additional(agent)
    }
}
