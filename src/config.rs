use crate::link::LinkConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_COMM_TIMEOUT_S: u64 = 10;
pub const MIN_COMM_TIMEOUT_S: u64 = 1;
pub const MAX_COMM_TIMEOUT_S: u64 = 60;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10;
pub const DEFAULT_IDLE_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DRAIN: usize = 100;
pub const DEFAULT_TASK: &str = "Control.Pioneer";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("comm_timeout_s must be within {min}..={max}, got {value}")]
    CommTimeout { value: u64, min: u64, max: u64 },
    #[error("{0} must be non-zero")]
    Zero(&'static str),
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub task: String,
    pub link: LinkConfig,
    /// Seconds without a decoded record before data is reported missing.
    pub comm_timeout_s: u64,
    pub poll_timeout_ms: u64,
    /// Sleep between iterations while no link exists.
    pub idle_delay_ms: u64,
    /// Reads per transport per iteration.
    pub max_drain: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            task: DEFAULT_TASK.to_string(),
            link: LinkConfig::default(),
            comm_timeout_s: DEFAULT_COMM_TIMEOUT_S,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            idle_delay_ms: DEFAULT_IDLE_DELAY_MS,
            max_drain: DEFAULT_MAX_DRAIN,
        }
    }
}

impl TaskConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: TaskConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_COMM_TIMEOUT_S..=MAX_COMM_TIMEOUT_S).contains(&self.comm_timeout_s) {
            return Err(ConfigError::CommTimeout {
                value: self.comm_timeout_s,
                min: MIN_COMM_TIMEOUT_S,
                max: MAX_COMM_TIMEOUT_S,
            });
        }
        if self.poll_timeout_ms == 0 {
            return Err(ConfigError::Zero("poll_timeout_ms"));
        }
        if self.max_drain == 0 {
            return Err(ConfigError::Zero("max_drain"));
        }
        if self.link.connect_timeout_ms == 0 {
            return Err(ConfigError::Zero("link.connect_timeout_ms"));
        }
        if self.link.stream_addr.trim().is_empty() {
            return Err(ConfigError::Empty("link.stream_addr"));
        }
        if self.link.datagram_addr.trim().is_empty() {
            return Err(ConfigError::Empty("link.datagram_addr"));
        }
        if self.task.trim().is_empty() {
            return Err(ConfigError::Empty("task"));
        }
        Ok(())
    }

    pub fn comm_timeout_ms(&self) -> u64 {
        self.comm_timeout_s * 1000
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }
}
