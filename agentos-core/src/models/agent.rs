use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle state of an agent as reported by the control plane.
///
/// The client only observes this value. Anything outside the known set is
/// kept verbatim in [`AgentStatus::Unknown`] instead of failing the decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Unknown(String),
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Running => "running",
            AgentStatus::Paused => "paused",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
            AgentStatus::Unknown(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Failed)
    }
}

impl From<String> for AgentStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending" => AgentStatus::Pending,
            "running" => AgentStatus::Running,
            "paused" => AgentStatus::Paused,
            "completed" => AgentStatus::Completed,
            "failed" => AgentStatus::Failed,
            _ => AgentStatus::Unknown(raw),
        }
    }
}

impl From<AgentStatus> for String {
    fn from(status: AgentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured form of a run's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentResult {
    Text(String),
    Structured(StructuredResult),
    Other(serde_json::Value),
}

impl AgentResult {
    /// Plain text is shown verbatim; anything else is pretty-printed JSON.
    pub fn display_text(&self) -> String {
        match self {
            AgentResult::Text(text) => text.clone(),
            AgentResult::Structured(structured) => serde_json::to_string_pretty(structured)
                .unwrap_or_else(|_| format!("{:?}", structured)),
            AgentResult::Other(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

/// The authoritative agent record, replaced wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub task: String,
    pub status: AgentStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_step: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_steps: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cost_usd: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub runtime_seconds: u64,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub estimated_cost_min: Option<f64>,
    #[serde(default)]
    pub estimated_cost_max: Option<f64>,
    #[serde(default)]
    pub result: Option<AgentResult>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Agent {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_kill(&self) -> bool {
        self.status == AgentStatus::Running
    }

    pub fn can_resume(&self) -> bool {
        matches!(self.status, AgentStatus::Failed | AgentStatus::Paused)
    }

    /// Both bounds, or nothing.
    pub fn estimated_cost_range(&self) -> Option<(f64, f64)> {
        match (self.estimated_cost_min, self.estimated_cost_max) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        }
    }
}

/// Body of `POST /agents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAgentRequest {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_usd: Option<f64>,
}

impl CreateAgentRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            provider: None,
            model: None,
            max_cost_usd: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedAgent {
    pub id: String,
    #[serde(default)]
    pub status: Option<AgentStatus>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub estimated_cost_min: Option<f64>,
    #[serde(default)]
    pub estimated_cost_max: Option<f64>,
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        let status: AgentStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(status, AgentStatus::Running);

        let status: AgentStatus = serde_json::from_str("\"hibernating\"").unwrap();
        assert_eq!(status, AgentStatus::Unknown("hibernating".to_string()));
        assert_eq!(status.to_string(), "hibernating");
        assert_eq!(
            serde_json::to_string(&AgentStatus::Paused).unwrap(),
            "\"paused\""
        );
    }

    #[test]
    fn test_agent_defaults_for_missing_and_null_fields() {
        let agent: Agent = serde_json::from_value(serde_json::json!({
            "id": "a-1",
            "task": "Example task",
            "status": "pending",
            "total_steps": null,
            "confidence_score": 85.0
        }))
        .unwrap();

        assert_eq!(agent.current_step, 0);
        assert_eq!(agent.total_steps, 0);
        assert_eq!(agent.cost_usd, 0.0);
        assert_eq!(agent.confidence_score, Some(85.0));
        assert!(agent.result.is_none());
        assert!(agent.estimated_cost_range().is_none());
    }

    #[test]
    fn test_command_availability() {
        let mut agent: Agent = serde_json::from_value(serde_json::json!({
            "id": "a-1",
            "status": "running"
        }))
        .unwrap();
        assert!(agent.can_kill());
        assert!(!agent.can_resume());

        agent.status = AgentStatus::Paused;
        assert!(!agent.can_kill());
        assert!(agent.can_resume());

        agent.status = AgentStatus::Failed;
        assert!(agent.can_resume());
        assert!(agent.is_terminal());

        agent.status = AgentStatus::Completed;
        assert!(!agent.can_resume());
    }

    #[test]
    fn test_result_variants() {
        let text: AgentResult = serde_json::from_str("\"all done\"").unwrap();
        assert_eq!(text.display_text(), "all done");

        let structured: AgentResult =
            serde_json::from_str(r#"{"content":"done","tokens":42,"cost":0.01}"#).unwrap();
        match &structured {
            AgentResult::Structured(s) => {
                assert_eq!(s.content.as_deref(), Some("done"));
                assert_eq!(s.tokens, Some(42));
            }
            other => panic!("expected structured result, got {:?}", other),
        }
        let shown = structured.display_text();
        assert!(shown.contains("\"content\": \"done\""));
        assert!(shown.contains("\"tokens\": 42"));

        let list: AgentResult = serde_json::from_str("[1, 2]").unwrap();
        assert!(matches!(list, AgentResult::Other(_)));
    }

    #[test]
    fn test_create_request_omits_unset_fields() {
        let body = serde_json::to_value(CreateAgentRequest::new("Summarise the report")).unwrap();
        assert_eq!(body, serde_json::json!({"task": "Summarise the report"}));
    }
}
