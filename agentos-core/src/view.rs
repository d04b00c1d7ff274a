//! Display-ready projection of an agent view.
//!
//! Everything here is a pure function of the current snapshot, timeline and
//! connection state; nothing is cached between derivations.

use chrono::Local;
use serde::Serialize;

use crate::config::DisplayConfig;
use crate::models::{Agent, AgentStatus, ConnectionState, TimelineEvent};

const TRUNCATION_MARKER: char = '…';

/// Visual category of an agent status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBadge {
    Info,
    Success,
    Danger,
    Warning,
    Neutral,
}

impl From<&AgentStatus> for StatusBadge {
    fn from(status: &AgentStatus) -> Self {
        match status {
            AgentStatus::Running => StatusBadge::Info,
            AgentStatus::Completed => StatusBadge::Success,
            AgentStatus::Failed => StatusBadge::Danger,
            AgentStatus::Paused => StatusBadge::Warning,
            AgentStatus::Pending | AgentStatus::Unknown(_) => StatusBadge::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
}

impl ConfidenceBand {
    pub const HIGH_THRESHOLD: f64 = 80.0;

    /// Absent or zero scores have no band.
    pub fn from_score(score: Option<f64>) -> Option<Self> {
        match score {
            Some(score) if score != 0.0 && !score.is_nan() => {
                if score >= Self::HIGH_THRESHOLD {
                    Some(ConfidenceBand::High)
                } else {
                    Some(ConfidenceBand::Medium)
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceView {
    pub score: f64,
    pub band: ConfidenceBand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntryView {
    pub time: String,
    pub action: String,
    pub status: String,
    pub badge: StatusBadge,
    pub step: u64,
    pub data: Option<String>,
    pub cost: Option<String>,
}

impl TimelineEntryView {
    pub fn from_event(event: &TimelineEvent, display: &DisplayConfig) -> Self {
        let time = event
            .parsed_timestamp()
            .map(|ts| ts.with_timezone(&Local).format(&display.time_format).to_string())
            .unwrap_or_else(|| event.timestamp.clone());

        let data = event
            .data
            .as_ref()
            .map(|data| truncate_preview(&data.to_pretty_json(), display.payload_preview_chars));

        let cost = (event.cost > 0.0).then(|| format_cost(event.cost, display.cost_precision));

        Self {
            time,
            action: event.action_label(),
            status: event.status.to_string(),
            badge: StatusBadge::from(&event.status),
            step: event.step,
            data,
            cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub agent_id: String,
    pub task: String,
    pub status: String,
    pub status_badge: StatusBadge,
    pub step_label: String,
    pub progress_percentage: u64,
    pub confidence: Option<ConfidenceView>,
    pub cost: String,
    pub estimated_cost: Option<String>,
    pub runtime: String,
    /// Newest first.
    pub displayed_timeline: Vec<TimelineEntryView>,
    pub result_view: Option<String>,
    pub error_view: Option<String>,
    pub can_kill: bool,
    pub can_resume: bool,
    pub connection: ConnectionState,
}

impl ViewModel {
    pub fn derive(
        agent: &Agent,
        timeline: &[TimelineEvent],
        connection: ConnectionState,
        display: &DisplayConfig,
    ) -> Self {
        let confidence = ConfidenceBand::from_score(agent.confidence_score).map(|band| {
            ConfidenceView {
                score: agent.confidence_score.unwrap_or_default(),
                band,
            }
        });

        let estimated_cost = agent
            .estimated_cost_range()
            .filter(|(min, max)| *min != 0.0 && *max != 0.0)
            .map(|(min, max)| {
                format!(
                    "Est: {} - {}",
                    format_cost(min, display.estimate_precision),
                    format_cost(max, display.estimate_precision)
                )
            });

        let displayed_timeline = timeline
            .iter()
            .rev()
            .map(|event| TimelineEntryView::from_event(event, display))
            .collect();

        Self {
            agent_id: agent.id.clone(),
            task: agent.task.clone(),
            status: agent.status.to_string(),
            status_badge: StatusBadge::from(&agent.status),
            step_label: format!("Step {}/{}", agent.current_step, agent.total_steps),
            progress_percentage: progress_percentage(agent.current_step, agent.total_steps),
            confidence,
            cost: format_cost(agent.cost_usd, display.cost_precision),
            estimated_cost,
            runtime: format!("{}s", agent.runtime_seconds),
            displayed_timeline,
            result_view: agent.result.as_ref().map(|result| result.display_text()),
            error_view: agent.error.clone(),
            can_kill: agent.can_kill(),
            can_resume: agent.can_resume(),
            connection,
        }
    }
}

/// Rounded to the nearest whole percent; 0 when the total is unknown.
pub fn progress_percentage(current_step: u64, total_steps: u64) -> u64 {
    if total_steps == 0 {
        return 0;
    }
    (current_step as f64 / total_steps as f64 * 100.0).round() as u64
}

pub fn format_cost(value: f64, precision: usize) -> String {
    format!("${:.*}", precision, value)
}

/// Caps `text` at `max_chars` characters, marking the cut.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut preview = text[..cut].to_string();
            preview.push(TRUNCATION_MARKER);
            preview
        }
        None => text.to_string(),
    }
}
