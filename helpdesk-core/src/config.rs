use chrono::{Duration, NaiveTime};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;

use crate::error::HelpdeskError;
use crate::models::{AdditionalAgent, AgentId, AgentLevel, RegularAgent};

#[derive(Debug, Deserialize, Clone)]
pub struct HelpdeskConfig {
    pub service: ServiceConfig,
    pub working_hours: WorkingHoursConfig,
    pub pool: PoolConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

/// Default window for additional agents that do not declare their own.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkingHoursConfig {
    #[serde(deserialize_with = "time_of_day")]
    pub start: NaiveTime,
    #[serde(deserialize_with = "time_of_day")]
    pub end: NaiveTime,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    pub maximum_concurrency_per_agent: u32,
    pub session_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AgentsConfig {
    #[serde(default)]
    pub regular: Vec<RegularAgentConfig>,
    #[serde(default)]
    pub additional: Vec<AdditionalAgentConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegularAgentConfig {
    pub id: AgentId,
    pub level: AgentLevel,
    #[serde(deserialize_with = "time_of_day")]
    pub shift_start: NaiveTime,
    pub shift_hours: u32,
    pub team: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdditionalAgentConfig {
    pub id: AgentId,
    #[serde(default, deserialize_with = "optional_time_of_day")]
    pub shift_start: Option<NaiveTime>,
    #[serde(default, deserialize_with = "optional_time_of_day")]
    pub shift_end: Option<NaiveTime>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8767,
        }
    }
}

/// Engine-facing settings: everything the allocation pool needs, already
/// converted into domain types.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub maximum_concurrency_per_agent: u32,
    pub session_timeout: Duration,
    pub regular_agents: Vec<RegularAgent>,
    pub additional_agents: Vec<AdditionalAgent>,
}

impl HelpdeskConfig {
    /// Loads `path` (any format the `config` crate understands), then applies
    /// `HELPDESK__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("HELPDESK").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    /// Load and validate in one step.
    pub fn load_validated(path: &str) -> Result<Self, HelpdeskError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HelpdeskError> {
        if self.pool.maximum_concurrency_per_agent == 0 {
            return Err(invalid("pool.maximum_concurrency_per_agent must be positive"));
        }
        if self.pool.session_timeout_seconds == 0 {
            return Err(invalid("pool.session_timeout_seconds must be positive"));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents.regular {
            if !seen.insert(agent.id) {
                return Err(invalid(format!("duplicate agent id {}", agent.id)));
            }
            if !(1..=23).contains(&agent.shift_hours) {
                return Err(invalid(format!(
                    "agent {}: shift_hours must be between 1 and 23, got {}",
                    agent.id, agent.shift_hours
                )));
            }
        }
        for agent in &self.agents.additional {
            if !seen.insert(agent.id) {
                return Err(invalid(format!("duplicate agent id {}", agent.id)));
            }
            let (start, end) = self.additional_window(agent);
            if start == end {
                return Err(invalid(format!(
                    "additional agent {}: shift start and end are both {}",
                    agent.id,
                    start.format("%H:%M")
                )));
            }
        }
        Ok(())
    }

    pub fn pool_settings(&self) -> PoolSettings {
        let regular_agents = self
            .agents
            .regular
            .iter()
            .map(|a| {
                RegularAgent::new(
                    a.id,
                    a.shift_start,
                    Duration::hours(i64::from(a.shift_hours)),
                    a.level,
                    a.team.clone(),
                )
            })
            .collect();

        let additional_agents = self
            .agents
            .additional
            .iter()
            .map(|a| {
                let (start, end) = self.additional_window(a);
                AdditionalAgent::new(a.id, start, end)
            })
            .collect();

        PoolSettings {
            maximum_concurrency_per_agent: self.pool.maximum_concurrency_per_agent,
            session_timeout: Duration::seconds(self.pool.session_timeout_seconds as i64),
            regular_agents,
            additional_agents,
        }
    }

    fn additional_window(&self, agent: &AdditionalAgentConfig) -> (NaiveTime, NaiveTime) {
        (
            agent.shift_start.unwrap_or(self.working_hours.start),
            agent.shift_end.unwrap_or(self.working_hours.end),
        )
    }
}

fn invalid(msg: impl Into<String>) -> HelpdeskError {
    HelpdeskError::InvalidConfig(msg.into())
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

fn time_of_day<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_time_of_day(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid time of day '{}'", raw)))
}

fn optional_time_of_day<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_time_of_day(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time of day '{}'", raw))),
        None => Ok(None),
    }
}
