//! Client-side synchronization for a single AgentOS agent view.
//!
//! An [`AgentSession`] combines a request/response snapshot of the agent with
//! its push-delivered event timeline, and exposes a derived [`ViewModel`]
//! plus the operator commands that apply to the agent.

#![allow(clippy::derivable_impls, clippy::type_complexity)]

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod reconciler;
pub mod scope;
pub mod session;
pub mod snapshot;
pub mod stream;
pub mod view;

pub use api::{ControlPlane, HttpControlPlane};
pub use commands::{
    AssumeYes, CommandController, CommandOutcome, Confirm, KILL_CONFIRMATION_PROMPT,
    KILL_FAILED_ALERT, RESUME_FAILED_ALERT,
};
pub use config::{
    get_config_dir, AgentOsConfig, ApiConfig, DisplayConfig, LoggingConfig, StreamConfig,
};
pub use error::{AgentOsError, AgentOsResult, CliErrorDisplay, RetryConfig};
pub use models::{
    Agent, AgentResult, AgentStatus, ConnectionState, CreateAgentRequest, CreatedAgent, DedupKey,
    EventData, ScalarValue, StructuredResult, TimelineEvent, WATCH_SET_ACTIONS,
};
pub use reconciler::{IngestOutcome, TimelineReconciler};
pub use scope::ViewScope;
pub use session::AgentSession;
pub use snapshot::SnapshotClient;
pub use stream::{decode_frame, EventStreamClient, StreamMessage, StreamOptions};
pub use view::{
    format_cost, progress_percentage, truncate_preview, ConfidenceBand, ConfidenceView,
    StatusBadge, TimelineEntryView, ViewModel,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
