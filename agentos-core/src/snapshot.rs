use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ControlPlane;
use crate::error::{AgentOsError, AgentOsResult};
use crate::models::{Agent, TimelineEvent};
use crate::scope::ViewScope;

/// Request/response access to one agent, and owner of its cached snapshot.
///
/// The snapshot is only ever replaced wholesale by a successful fetch; it is
/// never patched from push events.
pub struct SnapshotClient {
    control_plane: Arc<dyn ControlPlane>,
    agent_id: String,
    snapshot: watch::Sender<Option<Agent>>,
    applied: AtomicU64,
}

impl SnapshotClient {
    pub fn new(control_plane: Arc<dyn ControlPlane>, agent_id: impl Into<String>) -> Self {
        let (snapshot, _rx) = watch::channel(None);
        Self {
            control_plane,
            agent_id: agent_id.into(),
            snapshot,
            applied: AtomicU64::new(0),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn current(&self) -> Option<Agent> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Agent>> {
        self.snapshot.subscribe()
    }

    /// Number of fetches whose result replaced the snapshot.
    pub fn refresh_count(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Fetches the agent and, if `scope` is still live, replaces the cached
    /// snapshot with it.
    pub async fn fetch_agent(&self, scope: &ViewScope) -> AgentOsResult<Agent> {
        let agent = scope
            .run(self.control_plane.get_agent(&self.agent_id))
            .await
            .ok_or_else(|| AgentOsError::ViewClosed(self.agent_id.clone()))??;

        // The scope check happens under the snapshot lock so that `seal`
        // acts as a barrier against in-flight writers.
        let replaced = self.snapshot.send_if_modified(|slot| {
            if scope.is_cancelled() {
                false
            } else {
                *slot = Some(agent.clone());
                true
            }
        });

        if !replaced {
            return Err(AgentOsError::ViewClosed(self.agent_id.clone()));
        }
        self.applied.fetch_add(1, Ordering::Relaxed);

        debug!(
            agent_id = %self.agent_id,
            status = %agent.status,
            step = agent.current_step,
            "Agent snapshot replaced"
        );
        Ok(agent)
    }

    pub async fn fetch_timeline(&self) -> AgentOsResult<Vec<TimelineEvent>> {
        self.control_plane.get_timeline(&self.agent_id).await
    }

    pub async fn kill_agent(&self) -> AgentOsResult<()> {
        self.control_plane.kill_agent(&self.agent_id).await
    }

    pub async fn resume_agent(&self) -> AgentOsResult<()> {
        self.control_plane.resume_agent(&self.agent_id).await
    }

    /// Re-fetches the snapshot in the background. Failures are logged and
    /// leave the previous snapshot in place.
    pub fn schedule_refresh(self: &Arc<Self>, scope: &ViewScope) -> JoinHandle<()> {
        let client = Arc::clone(self);
        let scope = scope.clone();
        tokio::spawn(async move {
            match client.fetch_agent(&scope).await {
                Ok(_) => {}
                Err(AgentOsError::ViewClosed(_)) => {
                    debug!(agent_id = %client.agent_id, "Discarding refresh for closed view");
                }
                Err(e) => {
                    warn!(
                        agent_id = %client.agent_id,
                        error_code = e.error_code(),
                        "Snapshot refresh failed: {}",
                        e
                    );
                }
            }
        })
    }

    /// Waits out any writer currently inside `fetch_agent`. Call after the
    /// scope has been cancelled; no snapshot write can land afterwards.
    pub(crate) fn seal(&self) {
        self.snapshot.send_if_modified(|_| false);
    }
}
