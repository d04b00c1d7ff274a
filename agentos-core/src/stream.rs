use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AgentOsError, AgentOsResult, RetryConfig};
use crate::models::{ConnectionState, TimelineEvent};
use crate::scope::ViewScope;

type PushSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the push channel hands to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Event(TimelineEvent),
    /// The channel re-opened after a drop; events may have been missed.
    Resync,
}

#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// `None` leaves a dropped channel closed.
    pub reconnect: Option<RetryConfig>,
    pub connect_timeout: Option<Duration>,
}

/// Decodes one push-channel frame. Frames that are not a timeline event are
/// reported as [`AgentOsError::MalformedMessage`].
pub fn decode_frame(text: &str) -> AgentOsResult<TimelineEvent> {
    serde_json::from_str(text).map_err(|e| AgentOsError::MalformedMessage(e.to_string()))
}

/// Client side of the per-agent push channel.
///
/// Frames are decoded on a background task and forwarded, in arrival order,
/// to the sink handed to [`EventStreamClient::open`].
pub struct EventStreamClient {
    agent_id: String,
    state: Arc<watch::Sender<ConnectionState>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventStreamClient {
    pub fn open(
        agent_id: impl Into<String>,
        url: Url,
        options: StreamOptions,
        scope: ViewScope,
        sink: mpsc::Sender<StreamMessage>,
    ) -> Self {
        let agent_id = agent_id.into();
        let (state, _rx) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let reader = PushReader {
            agent_id: agent_id.clone(),
            url,
            options,
            scope,
            sink,
            state: Arc::clone(&state),
        };
        let task = tokio::spawn(reader.run(shutdown_rx));

        Self {
            agent_id,
            state,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// A client that never connects, for views whose channel address could
    /// not be built.
    pub fn closed(agent_id: impl Into<String>) -> Self {
        let (state, _rx) = watch::channel(ConnectionState::Closed);
        Self {
            agent_id: agent_id.into(),
            state: Arc::new(state),
            shutdown_tx: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Closes the channel if it is still open and waits for the reader to
    /// stop. Returns false if it had already been closed by this method.
    pub async fn close(&self) -> bool {
        let Some(shutdown_tx) = self.shutdown_tx.lock().await.take() else {
            return false;
        };
        let _ = shutdown_tx.send(());

        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(agent_id = %self.agent_id, "Push reader task failed: {}", e);
            }
        }

        self.state.send_replace(ConnectionState::Closed);
        info!(agent_id = %self.agent_id, "Push channel closed");
        true
    }
}

struct PushReader {
    agent_id: String,
    url: Url,
    options: StreamOptions,
    scope: ViewScope,
    sink: mpsc::Sender<StreamMessage>,
    state: Arc<watch::Sender<ConnectionState>>,
}

/// Why a connected session stopped reading.
enum SessionEnd {
    /// Shutdown, teardown or a gone consumer; do not reconnect.
    Stopped,
    Dropped,
}

impl PushReader {
    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut attempt: u32 = 0;
        let mut opened_before = false;

        loop {
            self.state.send_replace(ConnectionState::Connecting);

            let connected = tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                _ = self.scope.cancelled() => break,
                result = self.connect() => result,
            };

            match connected {
                Ok(socket) => {
                    attempt = 0;
                    self.state.send_replace(ConnectionState::Open);
                    info!(agent_id = %self.agent_id, url = %self.url, "Push channel open");

                    if opened_before && self.sink.send(StreamMessage::Resync).await.is_err() {
                        break;
                    }
                    opened_before = true;

                    let end = self.read_session(socket, &mut shutdown_rx).await;
                    self.state.send_replace(ConnectionState::Closed);
                    if let SessionEnd::Stopped = end {
                        break;
                    }
                    info!(agent_id = %self.agent_id, "Push channel closed by server");
                }
                Err(e) => {
                    self.state.send_replace(ConnectionState::Closed);
                    warn!(
                        agent_id = %self.agent_id,
                        error_code = e.error_code(),
                        "Failed to open push channel: {}",
                        e
                    );
                }
            }

            let Some(retry) = &self.options.reconnect else {
                break;
            };
            if attempt >= retry.max_attempts {
                warn!(
                    agent_id = %self.agent_id,
                    attempts = attempt,
                    "Giving up on push channel"
                );
                break;
            }

            let delay = retry.delay_for_attempt(attempt);
            attempt += 1;
            debug!(
                agent_id = %self.agent_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting push channel"
            );

            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                _ = self.scope.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state.send_replace(ConnectionState::Closed);
    }

    async fn connect(&self) -> AgentOsResult<PushSocket> {
        let connect = connect_async(self.url.as_str());
        let (socket, _response) = match self.options.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                AgentOsError::RequestTimeout(format!("opening push channel {}", self.url))
            })??,
            None => connect.await?,
        };
        Ok(socket)
    }

    async fn read_session(
        &self,
        socket: PushSocket,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> SessionEnd {
        let (mut write, mut read) = socket.split();

        loop {
            let frame = tokio::select! {
                biased;
                _ = &mut *shutdown_rx => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Stopped;
                }
                _ = self.scope.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Stopped;
                }
                frame = read.next() => frame,
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(agent_id = %self.agent_id, "Dropping non-UTF-8 push frame: {}", e);
                        continue;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(agent_id = %self.agent_id, ?frame, "Server sent close frame");
                    continue;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    let e = AgentOsError::from(e);
                    warn!(
                        agent_id = %self.agent_id,
                        error_code = e.error_code(),
                        "Push channel error: {}",
                        e
                    );
                    return SessionEnd::Dropped;
                }
                None => return SessionEnd::Dropped,
            };

            match decode_frame(&text) {
                Ok(event) => {
                    if self.scope.is_cancelled() {
                        return SessionEnd::Stopped;
                    }
                    if self.sink.send(StreamMessage::Event(event)).await.is_err() {
                        return SessionEnd::Stopped;
                    }
                }
                Err(e) => {
                    warn!(
                        agent_id = %self.agent_id,
                        error_code = e.error_code(),
                        "Dropping push message: {}",
                        e
                    );
                }
            }
        }
    }
}
