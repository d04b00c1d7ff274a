mod agent;
mod connection;
mod timeline;

pub use agent::{Agent, AgentResult, AgentStatus, CreateAgentRequest, CreatedAgent, StructuredResult};
pub use connection::ConnectionState;
pub use timeline::{DedupKey, EventData, ScalarValue, TimelineEvent, WATCH_SET_ACTIONS};

pub(crate) use timeline::TimelineEnvelope;
