pub mod agent;
pub mod session;

pub use agent::{
    AdditionalAgent, Agent, AgentCapability, AgentId, AgentLevel, RegularAgent,
};
pub use session::Session;
