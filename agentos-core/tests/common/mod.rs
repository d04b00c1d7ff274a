#![allow(dead_code)]

use agentos_core::{
    Agent, AgentOsError, AgentOsResult, ControlPlane, CreateAgentRequest, CreatedAgent,
    TimelineEvent,
};
use async_trait::async_trait;
use futures_util::SinkExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// In-memory control plane with call counters.
pub struct MockControlPlane {
    agent: Mutex<Option<serde_json::Value>>,
    timeline: Mutex<Vec<TimelineEvent>>,
    timeline_fails: Mutex<bool>,
    agent_delay: Mutex<Duration>,
    kill_status: Mutex<&'static str>,
    ws_url: Mutex<String>,
    pub agent_fetches: AtomicUsize,
    pub timeline_fetches: AtomicUsize,
    pub kills: AtomicUsize,
    pub resumes: AtomicUsize,
}

impl MockControlPlane {
    pub fn new(agent: serde_json::Value, ws_url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            agent: Mutex::new(Some(agent)),
            timeline: Mutex::new(Vec::new()),
            timeline_fails: Mutex::new(false),
            agent_delay: Mutex::new(Duration::ZERO),
            kill_status: Mutex::new("failed"),
            ws_url: Mutex::new(ws_url.into()),
            agent_fetches: AtomicUsize::new(0),
            timeline_fetches: AtomicUsize::new(0),
            kills: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        })
    }

    pub fn missing(ws_url: impl Into<String>) -> Arc<Self> {
        let plane = Self::new(serde_json::Value::Null, ws_url);
        *plane.agent.lock().unwrap() = None;
        plane
    }

    pub fn set_agent_field(&self, key: &str, value: serde_json::Value) {
        if let Some(agent) = self.agent.lock().unwrap().as_mut() {
            agent[key] = value;
        }
    }

    pub fn set_timeline(&self, events: Vec<TimelineEvent>) {
        *self.timeline.lock().unwrap() = events;
    }

    pub fn fail_timeline(&self) {
        *self.timeline_fails.lock().unwrap() = true;
    }

    pub fn set_agent_delay(&self, delay: Duration) {
        *self.agent_delay.lock().unwrap() = delay;
    }

    pub fn fetches(&self) -> usize {
        self.agent_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn get_agent(&self, agent_id: &str) -> AgentOsResult<Agent> {
        self.agent_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.agent_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let agent = self.agent.lock().unwrap().clone();
        match agent {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Err(AgentOsError::NotFound(agent_id.to_string())),
        }
    }

    async fn get_timeline(&self, _agent_id: &str) -> AgentOsResult<Vec<TimelineEvent>> {
        self.timeline_fetches.fetch_add(1, Ordering::SeqCst);
        if *self.timeline_fails.lock().unwrap() {
            return Err(AgentOsError::Transport("GET timeline returned 502".to_string()));
        }
        Ok(self.timeline.lock().unwrap().clone())
    }

    async fn kill_agent(&self, _agent_id: &str) -> AgentOsResult<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        let status = *self.kill_status.lock().unwrap();
        self.set_agent_field("status", serde_json::json!(status));
        Ok(())
    }

    async fn resume_agent(&self, _agent_id: &str) -> AgentOsResult<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        self.set_agent_field("status", serde_json::json!("running"));
        Ok(())
    }

    async fn create_agent(&self, _request: &CreateAgentRequest) -> AgentOsResult<CreatedAgent> {
        Err(AgentOsError::Internal("not supported by the mock".to_string()))
    }

    fn event_stream_url(&self, agent_id: &str) -> AgentOsResult<Url> {
        let base = self.ws_url.lock().unwrap().clone();
        Ok(Url::parse(&format!("{}/agents/{}", base, agent_id))?)
    }
}

pub enum ServerFrame {
    Text(String),
    /// Close the current connection and wait for the next one.
    Drop,
}

/// A local push-channel server. Frames queued with [`PushServer::send`] go
/// to whichever client is connected.
pub struct PushServer {
    pub addr: SocketAddr,
    frames: mpsc::UnboundedSender<ServerFrame>,
    pub connections: Arc<AtomicUsize>,
}

impl PushServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames, mut frames_rx) = mpsc::unbounded_channel::<ServerFrame>();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);

                while let Some(frame) = frames_rx.recv().await {
                    match frame {
                        ServerFrame::Text(text) => {
                            if ws.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        ServerFrame::Drop => {
                            let _ = ws.close(None).await;
                            break;
                        }
                    }
                }
            }
        });

        Self {
            addr,
            frames,
            connections,
        }
    }

    pub fn ws_base(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn send_event(&self, event: &TimelineEvent) {
        let text = serde_json::to_string(event).unwrap();
        let _ = self.frames.send(ServerFrame::Text(text));
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.frames.send(ServerFrame::Text(text.to_string()));
    }

    pub fn drop_connection(&self) {
        let _ = self.frames.send(ServerFrame::Drop);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

pub fn running_agent(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "task": "Summarise the quarterly report",
        "status": "running",
        "current_step": 3,
        "total_steps": 10,
        "cost_usd": 1.2345,
        "runtime_seconds": 42,
        "confidence_score": 85.0,
        "estimated_cost_min": 2.5,
        "estimated_cost_max": 4.0,
        "result": null,
        "error": null
    })
}

pub fn event(step: u64, action: &str) -> TimelineEvent {
    TimelineEvent::new(
        format!("2025-03-01T10:00:{:02}", step),
        action,
        agentos_core::AgentStatus::Running,
        step,
    )
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
