use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AgentOsError;
use crate::models::AgentStatus;
use crate::scope::ViewScope;
use crate::snapshot::SnapshotClient;

pub const KILL_CONFIRMATION_PROMPT: &str = "Are you sure you want to kill this agent?";
pub const KILL_FAILED_ALERT: &str = "Failed to kill agent. Please try again.";
pub const RESUME_FAILED_ALERT: &str = "Failed to resume agent. Please try again.";

/// Asks the operator to approve a destructive command.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Approves everything; for non-interactive callers that already asked.
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

#[derive(Debug)]
pub enum CommandOutcome {
    /// Dispatched and the snapshot was re-read.
    Completed(AgentStatus),
    /// The operator said no; nothing was sent.
    Declined,
    /// Not applicable to the agent in its current state; nothing was sent.
    Rejected(AgentOsError),
    /// Something failed after the operator asked for it. The message is
    /// meant to be shown as-is.
    Alert(String),
}

impl CommandOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CommandOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Kill,
    Resume,
}

impl Command {
    fn name(self) -> &'static str {
        match self {
            Command::Kill => "kill",
            Command::Resume => "resume",
        }
    }

    fn failure_alert(self) -> &'static str {
        match self {
            Command::Kill => KILL_FAILED_ALERT,
            Command::Resume => RESUME_FAILED_ALERT,
        }
    }
}

/// Operator commands for one agent view.
///
/// A command and the snapshot refresh that follows it form one unit; a
/// second command issued meanwhile waits for the first unit to finish.
pub struct CommandController {
    snapshot: Arc<SnapshotClient>,
    scope: ViewScope,
    in_flight: Mutex<()>,
}

impl CommandController {
    pub fn new(snapshot: Arc<SnapshotClient>, scope: ViewScope) -> Self {
        Self {
            snapshot,
            scope,
            in_flight: Mutex::new(()),
        }
    }

    pub async fn kill(&self, confirm: &dyn Confirm) -> CommandOutcome {
        let _unit = self.in_flight.lock().await;

        if let Err(rejection) = self.check(Command::Kill) {
            return rejection;
        }
        if !confirm.confirm(KILL_CONFIRMATION_PROMPT) {
            debug!(agent_id = %self.snapshot.agent_id(), "Kill declined by operator");
            return CommandOutcome::Declined;
        }

        let dispatched = self.snapshot.kill_agent().await;
        self.finish(Command::Kill, dispatched).await
    }

    pub async fn resume(&self) -> CommandOutcome {
        let _unit = self.in_flight.lock().await;

        if let Err(rejection) = self.check(Command::Resume) {
            return rejection;
        }

        let dispatched = self.snapshot.resume_agent().await;
        self.finish(Command::Resume, dispatched).await
    }

    fn check(&self, command: Command) -> Result<(), CommandOutcome> {
        let agent_id = self.snapshot.agent_id().to_string();
        if self.scope.is_cancelled() {
            return Err(CommandOutcome::Rejected(AgentOsError::ViewClosed(agent_id)));
        }

        let Some(agent) = self.snapshot.current() else {
            return Err(CommandOutcome::Rejected(AgentOsError::CommandRejected {
                agent: agent_id,
                command: command.name().to_string(),
                message: "agent snapshot has not been loaded".to_string(),
            }));
        };

        let applicable = match command {
            Command::Kill => agent.can_kill(),
            Command::Resume => agent.can_resume(),
        };
        if applicable {
            Ok(())
        } else {
            Err(CommandOutcome::Rejected(AgentOsError::CommandRejected {
                agent: agent_id,
                command: command.name().to_string(),
                message: format!("agent is {}", agent.status),
            }))
        }
    }

    async fn finish(
        &self,
        command: Command,
        dispatched: Result<(), AgentOsError>,
    ) -> CommandOutcome {
        let agent_id = self.snapshot.agent_id();

        if let Err(e) = dispatched {
            warn!(
                agent_id = %agent_id,
                command = command.name(),
                error_code = e.error_code(),
                "Command failed: {}",
                e
            );
            return CommandOutcome::Alert(command.failure_alert().to_string());
        }
        info!(agent_id = %agent_id, command = command.name(), "Command accepted");

        match self.snapshot.fetch_agent(&self.scope).await {
            Ok(agent) => CommandOutcome::Completed(agent.status),
            Err(AgentOsError::ViewClosed(_)) => CommandOutcome::Rejected(AgentOsError::ViewClosed(
                agent_id.to_string(),
            )),
            Err(e) => {
                warn!(
                    agent_id = %agent_id,
                    command = command.name(),
                    error_code = e.error_code(),
                    "Refresh after command failed: {}",
                    e
                );
                CommandOutcome::Alert(format!(
                    "The {} request was accepted, but the agent could not be refreshed: {}",
                    command.name(),
                    e
                ))
            }
        }
    }
}
