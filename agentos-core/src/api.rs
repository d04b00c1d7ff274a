use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{AgentOsError, AgentOsResult};
use crate::models::{
    Agent, CreateAgentRequest, CreatedAgent, TimelineEnvelope, TimelineEvent,
};

/// The remote control plane, as far as this client depends on it.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn get_agent(&self, agent_id: &str) -> AgentOsResult<Agent>;

    /// Full history in server order. Malformed bodies yield an empty list.
    async fn get_timeline(&self, agent_id: &str) -> AgentOsResult<Vec<TimelineEvent>>;

    async fn kill_agent(&self, agent_id: &str) -> AgentOsResult<()>;

    async fn resume_agent(&self, agent_id: &str) -> AgentOsResult<()>;

    async fn create_agent(&self, request: &CreateAgentRequest) -> AgentOsResult<CreatedAgent>;

    fn event_stream_url(&self, agent_id: &str) -> AgentOsResult<Url>;
}

pub struct HttpControlPlane {
    client: Client,
    base_url: Url,
    ws_base_url: Url,
}

impl HttpControlPlane {
    pub fn new(config: &ApiConfig) -> AgentOsResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AgentOsError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.base_url)?,
            ws_base_url: Url::parse(&config.ws_base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(base: &Url, segments: &[&str]) -> AgentOsResult<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| AgentOsError::InvalidConfigValue {
                key: "api.base_url".to_string(),
                message: format!("'{}' cannot be used as a base URL", base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post_command(&self, agent_id: &str, command: &str) -> AgentOsResult<()> {
        let url = Self::endpoint(&self.base_url, &["agents", agent_id, command])?;
        debug!(agent_id = %agent_id, command = %command, "POST {}", url);

        let response = self.client.post(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AgentOsError::NotFound(agent_id.to_string()));
        }
        if !status.is_success() {
            return Err(AgentOsError::Transport(format!(
                "POST /agents/{}/{} returned {}",
                agent_id, command, status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn get_agent(&self, agent_id: &str) -> AgentOsResult<Agent> {
        let url = Self::endpoint(&self.base_url, &["agents", agent_id])?;
        debug!(agent_id = %agent_id, "GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AgentOsError::NotFound(agent_id.to_string()));
        }
        if !status.is_success() {
            return Err(AgentOsError::Transport(format!(
                "GET /agents/{} returned {}",
                agent_id, status
            )));
        }

        Ok(response.json::<Agent>().await?)
    }

    async fn get_timeline(&self, agent_id: &str) -> AgentOsResult<Vec<TimelineEvent>> {
        let url = Self::endpoint(&self.base_url, &["agents", agent_id, "timeline"])?;
        debug!(agent_id = %agent_id, "GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentOsError::Transport(format!(
                "GET /agents/{}/timeline returned {}",
                agent_id, status
            )));
        }

        let body = response.bytes().await?;
        let events = serde_json::from_slice::<TimelineEnvelope>(&body)
            .and_then(TimelineEnvelope::into_events);

        match events {
            Ok(events) => Ok(events),
            Err(e) => {
                warn!(agent_id = %agent_id, "Ignoring malformed timeline response: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn kill_agent(&self, agent_id: &str) -> AgentOsResult<()> {
        self.post_command(agent_id, "kill").await
    }

    async fn resume_agent(&self, agent_id: &str) -> AgentOsResult<()> {
        self.post_command(agent_id, "resume").await
    }

    async fn create_agent(&self, request: &CreateAgentRequest) -> AgentOsResult<CreatedAgent> {
        let url = Self::endpoint(&self.base_url, &["agents"])?;
        debug!("POST {}", url);

        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentOsError::Transport(format!(
                "POST /agents returned {}",
                status
            )));
        }

        Ok(response.json::<CreatedAgent>().await?)
    }

    fn event_stream_url(&self, agent_id: &str) -> AgentOsResult<Url> {
        Self::endpoint(&self.ws_base_url, &["agents", agent_id])
    }
}
