//! Error types for the AgentOS core library.
//!
//! Every failure the synchronization layer can observe is one of these
//! variants. Callers decide how to surface it: the initial snapshot load
//! treats [`AgentOsError::is_fatal_to_view`] errors as a page-level error,
//! command paths turn them into alerts, and background paths only log.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E2001-E2099 | Config | Config file, environment and validation errors |
//! | E3001-E3099 | Agent | Unknown agents and rejected operator commands |
//! | E5001-E5099 | Transport | HTTP, push-channel and payload errors |
//! | E9001-E9099 | General | Internal, serialization and lifecycle errors |

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// Configuration for retry behavior with exponential backoff.
///
/// Only the push-channel reconnection uses this; request/response calls are
/// never retried automatically.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,
    /// Whether to add jitter so many dashboards do not reconnect in lockstep
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Retry config for reopening a dropped push channel.
    pub fn for_stream_reconnection(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // up to 25% extra
            let jitter_factor = 1.0 + (rand_jitter() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Returns a value between 0.0 and 1.0 derived from the clock.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// The main error type for the AgentOS core library.
#[derive(Debug, Error)]
pub enum AgentOsError {
    // ========================================================================
    // Configuration Errors (E2001-E2099)
    // ========================================================================
    /// Configuration file parse error
    #[error("[E2004] Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// Invalid configuration value
    #[error("[E2005] Invalid configuration value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    // ========================================================================
    // Agent Errors (E3001-E3099)
    // ========================================================================
    /// The control plane does not know this agent id
    #[error("[E3001] Agent not found: {0}")]
    NotFound(String),

    /// An operator command is not applicable in the agent's current state
    #[error("[E3004] Command '{command}' rejected for agent '{agent}': {message}")]
    CommandRejected {
        agent: String,
        command: String,
        message: String,
    },

    // ========================================================================
    // Transport Errors (E5001-E5099)
    // ========================================================================
    /// HTTP request failed or returned a non-success status
    #[error("[E5001] Transport error: {0}")]
    Transport(String),

    /// A push-channel payload could not be decoded as a timeline event
    #[error("[E5002] Malformed message: {0}")]
    MalformedMessage(String),

    /// Control plane could not be reached
    #[error("[E5005] Control plane unavailable: {0}")]
    ServiceUnavailable(String),

    /// A configured transport timeout elapsed
    #[error("[E5006] Request timed out: {0}")]
    RequestTimeout(String),

    /// The push channel failed to open or broke mid-stream
    #[error("[E5007] Push channel error: {0}")]
    Stream(String),

    // ========================================================================
    // General Errors (E9001-E9099)
    // ========================================================================
    /// Internal error (catch-all for unexpected conditions)
    #[error("[E9001] Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error
    #[error("[E9006] Serialization error: {0}")]
    SerializationError(String),

    /// The view owning this operation was torn down
    #[error("[E9007] View for agent '{0}' was closed")]
    ViewClosed(String),
}

/// Result type alias for AgentOS operations.
pub type AgentOsResult<T> = Result<T, AgentOsError>;

// ============================================================================
// From trait implementations for seamless error propagation
// ============================================================================

impl From<reqwest::Error> for AgentOsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AgentOsError::RequestTimeout(err.to_string())
        } else if err.is_connect() {
            AgentOsError::ServiceUnavailable(err.to_string())
        } else if err.is_status() && err.status().map(|s| s.as_u16()) == Some(404) {
            AgentOsError::NotFound(
                err.url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            )
        } else {
            AgentOsError::Transport(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AgentOsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Io(e) => AgentOsError::ServiceUnavailable(e.to_string()),
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                AgentOsError::Stream("connection closed".to_string())
            }
            other => AgentOsError::Stream(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AgentOsError {
    fn from(err: serde_json::Error) -> Self {
        AgentOsError::SerializationError(err.to_string())
    }
}

impl From<url::ParseError> for AgentOsError {
    fn from(err: url::ParseError) -> Self {
        AgentOsError::InvalidConfigValue {
            key: "url".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AgentOsError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => AgentOsError::InvalidConfigValue {
                key,
                message: "Key not found".to_string(),
            },
            config::ConfigError::FileParse { uri, cause } => AgentOsError::ConfigParseError(
                format!("Failed to parse {}: {}", uri.unwrap_or_default(), cause),
            ),
            config::ConfigError::Type {
                origin,
                unexpected,
                expected,
                key,
            } => AgentOsError::InvalidConfigValue {
                key: key.unwrap_or_else(|| origin.map(|o| o.to_string()).unwrap_or_default()),
                message: format!("Expected {}, got {}", expected, unexpected),
            },
            _ => AgentOsError::ConfigParseError(err.to_string()),
        }
    }
}

// ============================================================================
// Error categorization helpers
// ============================================================================

impl AgentOsError {
    /// Returns true for any network/HTTP/push-channel failure.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            AgentOsError::Transport(_)
                | AgentOsError::ServiceUnavailable(_)
                | AgentOsError::RequestTimeout(_)
                | AgentOsError::Stream(_)
        )
    }

    /// Returns true if this error is related to configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            AgentOsError::ConfigParseError(_) | AgentOsError::InvalidConfigValue { .. }
        )
    }

    /// Returns true if a failed initial snapshot load with this error must
    /// block the view.
    pub fn is_fatal_to_view(&self) -> bool {
        matches!(self, AgentOsError::NotFound(_)) || self.is_transport_error()
    }

    /// Returns true if this error is transient and the operation might succeed
    /// if the operator tries again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentOsError::ServiceUnavailable(_)
                | AgentOsError::RequestTimeout(_)
                | AgentOsError::Stream(_)
        )
    }

    /// Returns an error code suitable for logging or external reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            AgentOsError::ConfigParseError(_) => "E2004",
            AgentOsError::InvalidConfigValue { .. } => "E2005",
            AgentOsError::NotFound(_) => "E3001",
            AgentOsError::CommandRejected { .. } => "E3004",
            AgentOsError::Transport(_) => "E5001",
            AgentOsError::MalformedMessage(_) => "E5002",
            AgentOsError::ServiceUnavailable(_) => "E5005",
            AgentOsError::RequestTimeout(_) => "E5006",
            AgentOsError::Stream(_) => "E5007",
            AgentOsError::Internal(_) => "E9001",
            AgentOsError::SerializationError(_) => "E9006",
            AgentOsError::ViewClosed(_) => "E9007",
        }
    }

    /// Returns a user-friendly suggestion for how to resolve this error.
    pub fn user_suggestion(&self) -> Option<&'static str> {
        match self {
            AgentOsError::NotFound(_) => Some("Check the agent id, or start one with 'agentos start'"),
            AgentOsError::ServiceUnavailable(_) => {
                Some("Check that the control plane is running and AGENTOS_API_BASE_URL is correct")
            }
            AgentOsError::ConfigParseError(_) | AgentOsError::InvalidConfigValue { .. } => {
                Some("Run 'agentos config' to inspect the effective configuration")
            }
            AgentOsError::CommandRejected { .. } => {
                Some("Run 'agentos show <id>' to see which actions are available")
            }
            _ => None,
        }
    }

    /// Log this error with appropriate severity level.
    pub fn log(&self) {
        let code = self.error_code();
        let suggestion = self.user_suggestion();

        if self.is_transient() {
            warn!(
                error_code = %code,
                suggestion = suggestion,
                "Transient error occurred: {}",
                self
            );
        } else {
            error!(
                error_code = %code,
                suggestion = suggestion,
                "Error occurred: {}",
                self
            );
        }
    }
}

// ============================================================================
// User-friendly error formatting for CLI
// ============================================================================

/// Format an error for CLI display with suggestions.
pub struct CliErrorDisplay<'a> {
    error: &'a AgentOsError,
    show_suggestion: bool,
}

impl<'a> CliErrorDisplay<'a> {
    pub fn new(error: &'a AgentOsError) -> Self {
        Self {
            error,
            show_suggestion: true,
        }
    }

    pub fn without_suggestion(mut self) -> Self {
        self.show_suggestion = false;
        self
    }
}

impl<'a> fmt::Display for CliErrorDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;

        if self.show_suggestion {
            if let Some(suggestion) = self.error.user_suggestion() {
                writeln!(f)?;
                writeln!(f, "  Suggestion: {}", suggestion)?;
            }
        }

        if self.error.is_transient() {
            writeln!(f)?;
            writeln!(f, "  This error may be temporary. Try again shortly.")?;
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
