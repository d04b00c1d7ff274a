use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::agent::{null_as_default, AgentStatus};

/// Actions whose effect on the agent record is not carried by the event
/// itself; seeing one means the snapshot has to be re-read.
pub const WATCH_SET_ACTIONS: [&str; 3] = ["agent_started", "agent_completed", "agent_failed"];

/// A single scalar value inside an event's `data` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

/// Flat, purely informational payload attached to an event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventData(pub BTreeMap<String, ScalarValue>);

impl EventData {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.0.get(key)
    }

    /// Two-space indented JSON, the form the dashboard has always shown.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: String,
    pub action: String,
    pub status: AgentStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub step: u64,
    #[serde(default)]
    pub data: Option<EventData>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cost: f64,
}

/// Identity of a logical event for redelivery detection.
pub type DedupKey = (String, String, u64);

impl TimelineEvent {
    pub fn new(
        timestamp: impl Into<String>,
        action: impl Into<String>,
        status: AgentStatus,
        step: u64,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            action: action.into(),
            status,
            step,
            data: None,
            cost: 0.0,
        }
    }

    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// True when this action signals a status transition.
    pub fn requires_snapshot_refresh(&self) -> bool {
        WATCH_SET_ACTIONS.contains(&self.action.as_str())
    }

    pub fn dedup_key(&self) -> DedupKey {
        (self.timestamp.clone(), self.action.clone(), self.step)
    }

    /// Accepts RFC 3339 as well as the naive ISO-8601 form the control
    /// plane writes, which is interpreted as UTC.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// "agent_started" -> "agent started".
    pub fn action_label(&self) -> String {
        self.action.replace('_', " ")
    }
}

/// Body of `GET /agents/{id}/timeline`. Anything that does not fit yields
/// an empty history rather than an error.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TimelineEnvelope {
    #[serde(default)]
    timeline: serde_json::Value,
}

impl TimelineEnvelope {
    pub(crate) fn into_events(self) -> Result<Vec<TimelineEvent>, serde_json::Error> {
        match self.timeline {
            serde_json::Value::Array(_) => serde_json::from_value(self.timeline),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "timestamp": "2025-03-01T10:15:30.123456",
            "action": "llm_call",
            "status": "running",
            "step": 2,
            "data": {"model": "gpt-4", "tokens": 512, "cached": false, "note": null},
            "cost": 0.0123
        })
    }

    #[test]
    fn test_decode_full_event() {
        let event: TimelineEvent = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(event.action, "llm_call");
        assert_eq!(event.status, AgentStatus::Running);
        assert_eq!(event.step, 2);
        let data = event.data.as_ref().unwrap();
        assert_eq!(data.len(), 4);
        assert_eq!(data.get("cached"), Some(&ScalarValue::Bool(false)));
        assert_eq!(data.get("note"), Some(&ScalarValue::Null));
        assert!(matches!(data.get("tokens"), Some(ScalarValue::Number(_))));
    }

    #[test]
    fn test_nested_data_is_rejected() {
        let mut value = sample_json();
        value["data"] = serde_json::json!({"nested": {"a": 1}});
        assert!(serde_json::from_value::<TimelineEvent>(value).is_err());
    }

    #[test]
    fn test_cost_and_step_default() {
        let event: TimelineEvent = serde_json::from_value(serde_json::json!({
            "timestamp": "2025-03-01T10:15:30Z",
            "action": "checkpoint",
            "status": "running",
            "step": null,
            "cost": null
        }))
        .unwrap();
        assert_eq!(event.step, 0);
        assert_eq!(event.cost, 0.0);
        assert!(event.data.is_none());
    }

    #[test]
    fn test_watch_set() {
        for action in WATCH_SET_ACTIONS {
            let event = TimelineEvent::new("t", action, AgentStatus::Running, 0);
            assert!(event.requires_snapshot_refresh(), "{action}");
        }
        let event = TimelineEvent::new("t", "tool_use", AgentStatus::Running, 0);
        assert!(!event.requires_snapshot_refresh());
    }

    #[test]
    fn test_parsed_timestamp_formats() {
        let naive = TimelineEvent::new("2025-03-01T10:15:30.5", "x", AgentStatus::Running, 0);
        let parsed = naive.parsed_timestamp().unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-03-01T10:15:30.500+00:00");

        let offset = TimelineEvent::new("2025-03-01T12:15:30+02:00", "x", AgentStatus::Running, 0);
        assert_eq!(offset.parsed_timestamp(), Some(parsed - chrono::Duration::milliseconds(500)));

        let garbage = TimelineEvent::new("yesterday", "x", AgentStatus::Running, 0);
        assert!(garbage.parsed_timestamp().is_none());
    }

    #[test]
    fn test_envelope_leniency() {
        let ok: TimelineEnvelope =
            serde_json::from_value(serde_json::json!({"timeline": [sample_json()]})).unwrap();
        assert_eq!(ok.into_events().unwrap().len(), 1);

        let missing: TimelineEnvelope = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(missing.into_events().unwrap().is_empty());

        let wrong_type: TimelineEnvelope =
            serde_json::from_value(serde_json::json!({"timeline": "soon"})).unwrap();
        assert!(wrong_type.into_events().unwrap().is_empty());
    }

    #[test]
    fn test_pretty_data_uses_two_space_indent() {
        let mut map = BTreeMap::new();
        map.insert("tool".to_string(), ScalarValue::String("search".to_string()));
        let pretty = EventData(map).to_pretty_json();
        assert_eq!(pretty, "{\n  \"tool\": \"search\"\n}");
    }
}
