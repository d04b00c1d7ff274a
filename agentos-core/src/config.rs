use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AgentOsError, AgentOsResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentOsConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,

    /// 0 leaves requests without a timeout.
    #[serde(default)]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub reconnect: bool,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default)]
    pub deduplicate: bool,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_payload_preview_chars")]
    pub payload_preview_chars: usize,

    #[serde(default = "default_cost_precision")]
    pub cost_precision: usize,

    #[serde(default = "default_estimate_precision")]
    pub estimate_precision: usize,

    #[serde(default = "default_time_format")]
    pub time_format: String,

    #[serde(default = "default_true")]
    pub color: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_ws_base_url() -> String {
    "ws://localhost:8000/ws".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_channel_capacity() -> usize {
    256
}

fn default_payload_preview_chars() -> usize {
    100
}

fn default_cost_precision() -> usize {
    4
}

fn default_estimate_precision() -> usize {
    2
}

fn default_time_format() -> String {
    "%H:%M:%S".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_base_url: default_ws_base_url(),
            request_timeout_secs: 0,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect: false,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            deduplicate: false,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            payload_preview_chars: default_payload_preview_chars(),
            cost_precision: default_cost_precision(),
            estimate_precision: default_estimate_precision(),
            time_format: default_time_format(),
            color: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_secs > 0).then(|| Duration::from_secs(self.connect_timeout_secs))
    }
}

impl AgentOsConfig {
    pub fn load() -> AgentOsResult<Self> {
        Self::load_from_paths(get_config_paths())
    }

    pub fn load_from_paths(paths: Vec<PathBuf>) -> AgentOsResult<Self> {
        load_dotenv_files();

        let mut builder = ConfigBuilder::builder();

        for path in paths {
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("AGENTOS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut agentos_config: AgentOsConfig = builder.build()?.try_deserialize()?;

        // Flat aliases for the values operators override most often.
        if let Ok(url) = std::env::var("AGENTOS_API_BASE_URL") {
            agentos_config.api.base_url = url;
        }
        if let Ok(url) = std::env::var("AGENTOS_WS_BASE_URL") {
            agentos_config.api.ws_base_url = url;
        }
        if let Ok(level) = std::env::var("AGENTOS_LOG_LEVEL") {
            agentos_config.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            agentos_config.logging.level = level;
        }

        agentos_config.validate()?;

        Ok(agentos_config)
    }

    pub fn validate(&self) -> AgentOsResult<()> {
        if self.api.base_url.is_empty() {
            return Err(AgentOsError::InvalidConfigValue {
                key: "api.base_url".to_string(),
                message: "Must not be empty".to_string(),
            });
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(AgentOsError::InvalidConfigValue {
                key: "api.base_url".to_string(),
                message: "Must start with http:// or https://".to_string(),
            });
        }

        if !self.api.ws_base_url.starts_with("ws://") && !self.api.ws_base_url.starts_with("wss://")
        {
            return Err(AgentOsError::InvalidConfigValue {
                key: "api.ws_base_url".to_string(),
                message: "Must start with ws:// or wss://".to_string(),
            });
        }

        if self.display.payload_preview_chars == 0 {
            return Err(AgentOsError::InvalidConfigValue {
                key: "display.payload_preview_chars".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.stream.channel_capacity == 0 {
            return Err(AgentOsError::InvalidConfigValue {
                key: "stream.channel_capacity".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !valid_levels.contains(&level_lower.as_str()) && !level_lower.contains('=') {
            return Err(AgentOsError::InvalidConfigValue {
                key: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Must be one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        Ok(())
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }
}

fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("config").join("default.toml"));
        paths.push(cwd.join("config").join("local.toml"));
        paths.push(cwd.join("agentos.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("agentos").join("config.toml"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".agentos").join("config.toml"));
    }

    paths
}

fn load_dotenv_files() {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".env"));
        paths.push(cwd.join(".env.local"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".agentos").join(".env"));
    }

    for path in paths {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("agentos"))
}
