pub mod agent_queue;
pub mod allocation;
pub mod clock;
pub mod config;
pub mod error;
pub mod ipc;
pub mod manager;
pub mod models;
pub mod scheduler;
pub mod store;

pub use agent_queue::AgentQueue;
pub use allocation::{AgentSnapshot, AllocationManager};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HelpdeskConfig, PoolSettings};
pub use error::HelpdeskError;
pub use ipc::{
    CreateSessionCode, CreateSessionResponse, HelpdeskRequest, HelpdeskResponse,
    SessionActionCode, SessionActionResponse, SessionIdRequest,
};
pub use manager::{ManagerStatus, SessionManager};
pub use models::{AdditionalAgent, Agent, AgentCapability, AgentId, AgentLevel, RegularAgent, Session};
pub use scheduler::ShiftScheduler;
pub use store::SessionStore;
