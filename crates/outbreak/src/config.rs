use std::path::PathBuf;
use std::time::Duration;

use crate::builder::{ColumnMapping, DEFAULT_MIN_REGIONS};
use crate::source::{SourcePreset, TableLayout};
use crate::store::DEFAULT_STORE_PATH;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub url: String,
    pub layout: TableLayout,
    pub mapping: ColumnMapping,
    pub timeout: Duration,
}

impl SourceConfig {
    /// Layout and column mapping of `preset`, fetched from `url`.
    pub fn from_preset(preset: SourcePreset, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            layout: preset.layout(),
            mapping: preset.mapping(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub group_chat: String,
    pub fault_chat: String,
    /// Deliver without a notification sound.
    pub silent: bool,
    pub api_base: String,
    pub timeout: Duration,
}

impl TelegramConfig {
    pub fn new(
        token: impl Into<String>,
        group_chat: impl Into<String>,
        fault_chat: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            group_chat: group_chat.into(),
            fault_chat: fault_chat.into(),
            silent: false,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Everything one cycle needs. Built once at startup and handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub telegram: TelegramConfig,
    pub store_path: PathBuf,
    pub archive_dir: Option<PathBuf>,
    pub min_regions: usize,
}

impl Config {
    pub fn new(source: SourceConfig, telegram: TelegramConfig) -> Self {
        Self {
            source,
            telegram,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            archive_dir: None,
            min_regions: DEFAULT_MIN_REGIONS,
        }
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.telegram.token.trim().is_empty() {
            return Err(ConfigError::Missing("TELEGRAM_TOKEN"));
        }
        if self.telegram.group_chat.trim().is_empty() {
            return Err(ConfigError::Missing("TELEGRAM_GROUP"));
        }
        if self.telegram.fault_chat.trim().is_empty() {
            return Err(ConfigError::Missing("TELEGRAM_FAULT"));
        }
        if self.source.url.trim().is_empty() {
            return Err(ConfigError::Missing("source url"));
        }
        if self.source.mapping.metrics.is_empty() {
            return Err(ConfigError::Invalid {
                name: "metrics",
                reason: "at least one metric column is required".to_string(),
            });
        }
        if self.source.timeout.is_zero() || self.telegram.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "timeout",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.min_regions == 0 {
            return Err(ConfigError::Invalid {
                name: "min_regions",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(self)
    }
}
