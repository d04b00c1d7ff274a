use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ControlPlane;
use crate::commands::CommandController;
use crate::config::{AgentOsConfig, DisplayConfig};
use crate::error::{AgentOsResult, RetryConfig};
use crate::models::{Agent, ConnectionState, TimelineEvent};
use crate::reconciler::TimelineReconciler;
use crate::scope::ViewScope;
use crate::snapshot::SnapshotClient;
use crate::stream::{EventStreamClient, StreamMessage, StreamOptions};
use crate::view::ViewModel;

/// One mounted agent view: snapshot, timeline and push channel kept in sync
/// until [`AgentSession::teardown`].
pub struct AgentSession {
    agent_id: String,
    scope: ViewScope,
    display: DisplayConfig,
    snapshot: Arc<SnapshotClient>,
    timeline: watch::Receiver<Vec<TimelineEvent>>,
    stream: Arc<EventStreamClient>,
    commands: CommandController,
    views: watch::Receiver<Option<ViewModel>>,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentSession {
    /// Loads the snapshot and the history concurrently, then opens the push
    /// channel.
    ///
    /// Only a failed snapshot load fails the mount. A failed history load
    /// leaves the timeline empty and a failed channel leaves it closed.
    pub async fn mount(
        control_plane: Arc<dyn ControlPlane>,
        agent_id: impl Into<String>,
        config: &AgentOsConfig,
    ) -> AgentOsResult<Self> {
        let agent_id = agent_id.into();
        let scope = ViewScope::new();
        let snapshot = Arc::new(SnapshotClient::new(Arc::clone(&control_plane), agent_id.clone()));

        let (agent, history) = tokio::join!(snapshot.fetch_agent(&scope), snapshot.fetch_timeline());

        if let Err(e) = &agent {
            e.log();
        }
        let agent = agent?;

        let history = history.unwrap_or_else(|e| {
            warn!(
                agent_id = %agent_id,
                error_code = e.error_code(),
                "Timeline load failed, starting with an empty history: {}",
                e
            );
            Vec::new()
        });

        info!(
            agent_id = %agent_id,
            status = %agent.status,
            history = history.len(),
            "Agent view mounted"
        );

        let reconciler = TimelineReconciler::new(history, config.stream.deduplicate);
        let timeline = reconciler.subscribe();

        let (sink, inbound) = mpsc::channel(config.stream.channel_capacity);
        let options = StreamOptions {
            reconnect: config
                .stream
                .reconnect
                .then(|| RetryConfig::for_stream_reconnection(config.stream.max_reconnect_attempts)),
            connect_timeout: config.api.connect_timeout(),
        };
        let stream = match control_plane.event_stream_url(&agent_id) {
            Ok(url) => EventStreamClient::open(agent_id.clone(), url, options, scope.clone(), sink),
            Err(e) => {
                warn!(
                    agent_id = %agent_id,
                    error_code = e.error_code(),
                    "Cannot open push channel: {}",
                    e
                );
                EventStreamClient::closed(agent_id.clone())
            }
        };
        let stream = Arc::new(stream);

        let ingest = tokio::spawn(ingest_loop(
            reconciler,
            inbound,
            Arc::clone(&snapshot),
            scope.clone(),
        ));

        let (view_tx, views) = watch::channel(None);
        let publisher = tokio::spawn(publish_views(
            snapshot.subscribe(),
            timeline.clone(),
            stream.subscribe(),
            config.display.clone(),
            view_tx,
            scope.clone(),
        ));

        let commands = CommandController::new(Arc::clone(&snapshot), scope.clone());

        Ok(Self {
            agent_id,
            scope,
            display: config.display.clone(),
            snapshot,
            timeline,
            stream,
            commands,
            views,
            tasks: vec![ingest, publisher],
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }

    pub fn is_closed(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn snapshot(&self) -> Option<Agent> {
        self.snapshot.current()
    }

    pub fn timeline(&self) -> Vec<TimelineEvent> {
        self.timeline.borrow().clone()
    }

    pub fn connection(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn commands(&self) -> &CommandController {
        &self.commands
    }

    /// Derives the view from the current state.
    pub fn view(&self) -> Option<ViewModel> {
        let agent = self.snapshot.current()?;
        let timeline = self.timeline.borrow();
        Some(ViewModel::derive(&agent, &timeline, self.stream.state(), &self.display))
    }

    /// Views re-derived whenever the snapshot, timeline or connection state
    /// changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<ViewModel>> {
        self.views.clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Option<Agent>> {
        self.snapshot.subscribe()
    }

    pub fn subscribe_timeline(&self) -> watch::Receiver<Vec<TimelineEvent>> {
        self.timeline.clone()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.stream.subscribe()
    }

    /// Ends the view. Closes the push channel, stops all background work and
    /// guarantees that no result arriving later changes any state.
    pub async fn teardown(mut self) {
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        if !self.scope.cancel() {
            return;
        }
        self.snapshot.seal();
        self.stream.close().await;

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(agent_id = %self.agent_id, "View task failed: {}", e);
            }
        }
        info!(agent_id = %self.agent_id, "Agent view torn down");
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        if self.scope.cancel() {
            self.snapshot.seal();
            debug!(agent_id = %self.agent_id, "Agent view dropped without teardown");
        }
    }
}

/// Sole consumer of the push channel and sole writer of the timeline.
async fn ingest_loop(
    mut reconciler: TimelineReconciler,
    mut inbound: mpsc::Receiver<StreamMessage>,
    snapshot: Arc<SnapshotClient>,
    scope: ViewScope,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            message = inbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        if scope.is_cancelled() {
            break;
        }

        match message {
            StreamMessage::Event(event) => {
                let action = event.action.clone();
                let outcome = reconciler.ingest(event);
                if outcome.refresh_required {
                    debug!(
                        agent_id = %snapshot.agent_id(),
                        action = %action,
                        "Status transition, refreshing snapshot"
                    );
                    snapshot.schedule_refresh(&scope);
                }
            }
            StreamMessage::Resync => {
                match scope.run(snapshot.fetch_timeline()).await {
                    None => break,
                    Some(Ok(history)) => {
                        let added = reconciler.merge_history(history);
                        info!(
                            agent_id = %snapshot.agent_id(),
                            added,
                            "Timeline resynchronized after reconnect"
                        );
                    }
                    Some(Err(e)) => {
                        warn!(
                            agent_id = %snapshot.agent_id(),
                            error_code = e.error_code(),
                            "Timeline resync failed: {}",
                            e
                        );
                    }
                }
                snapshot.schedule_refresh(&scope);
            }
        }
    }
    debug!(agent_id = %snapshot.agent_id(), "Ingestion stopped");
}

/// Runs until the scope is cancelled. The timeline and connection senders
/// go away when the push channel ends, but snapshot refreshes scheduled by
/// the last events still have to reach the view.
async fn publish_views(
    mut snapshot: watch::Receiver<Option<Agent>>,
    mut timeline: watch::Receiver<Vec<TimelineEvent>>,
    mut connection: watch::Receiver<ConnectionState>,
    display: DisplayConfig,
    views: watch::Sender<Option<ViewModel>>,
    scope: ViewScope,
) {
    let mut timeline_open = true;
    let mut connection_open = true;

    loop {
        let view = {
            let agent = snapshot.borrow_and_update();
            let events = timeline.borrow_and_update();
            let state = *connection.borrow_and_update();
            agent
                .as_ref()
                .map(|agent| ViewModel::derive(agent, &events, state, &display))
        };
        views.send_replace(view);

        tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            changed = snapshot.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = timeline.changed(), if timeline_open => {
                if changed.is_err() {
                    debug!("Timeline writer finished, publishing snapshot changes only");
                    timeline_open = false;
                }
            }
            changed = connection.changed(), if connection_open => {
                if changed.is_err() {
                    connection_open = false;
                }
            }
        }
    }
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("agent_id", &self.agent_id)
            .field("closed", &self.is_closed())
            .field("connection", &self.connection())
            .finish()
    }
}
