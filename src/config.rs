//! Application constants and the explicit analysis configuration.
//!
//! `AnalysisConfig` is built once at startup (defaults, then environment
//! overrides) and handed by reference to every entry point. Nothing in the
//! pipeline re-reads the environment mid-request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "dualcite";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Narrative field aliases looked up on engine results, in priority order.
pub const DEFAULT_NARRATIVE_FIELDS: &[&str] = &["analysis", "report", "content", "text"];

/// Label used for an uploaded document whose declared filename is empty.
pub const DEFAULT_DOCUMENT_LABEL: &str = "用户投喂文件";

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024; // 20MB
const DEFAULT_ENGINE_URL: &str = "http://localhost:8000";
const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_NOTIFY_QUEUE: usize = 64;

/// Default tracing filter when neither `RUST_LOG` nor `DUALCITE_LOG` is set.
pub fn default_log_filter() -> &'static str {
    "info"
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("At least one narrative field name is required")]
    NoNarrativeFields,
}

/// Connection settings for the external analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ENGINE_URL.to_string(),
            timeout_secs: DEFAULT_ENGINE_TIMEOUT_SECS,
        }
    }
}

/// Process-wide analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Candidate narrative field names, tried in order.
    pub narrative_fields: Vec<String>,
    /// Source label for uploads that arrive without a usable filename.
    pub default_document_label: String,
    /// Uploads above this size are not parsed.
    pub max_upload_bytes: u64,
    pub engine: EngineConfig,
    /// Bounded capacity of the notification queue.
    pub notification_queue_capacity: usize,
    pub log_filter: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            narrative_fields: DEFAULT_NARRATIVE_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            default_document_label: DEFAULT_DOCUMENT_LABEL.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            engine: EngineConfig::default(),
            notification_queue_capacity: DEFAULT_NOTIFY_QUEUE,
            log_filter: default_log_filter().to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Defaults overridden by `DUALCITE_*` process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("DUALCITE_NARRATIVE_FIELDS") {
            config.narrative_fields = raw
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(label) = lookup("DUALCITE_DEFAULT_LABEL") {
            if !label.trim().is_empty() {
                config.default_document_label = label.trim().to_string();
            }
        }
        if let Some(raw) = lookup("DUALCITE_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse_number("DUALCITE_MAX_UPLOAD_BYTES", &raw)?;
        }
        if let Some(url) = lookup("DUALCITE_ENGINE_URL") {
            config.engine.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup("DUALCITE_ENGINE_TIMEOUT_SECS") {
            config.engine.timeout_secs = parse_number("DUALCITE_ENGINE_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("DUALCITE_NOTIFY_QUEUE") {
            config.notification_queue_capacity = parse_number("DUALCITE_NOTIFY_QUEUE", &raw)?;
        }
        if let Some(filter) = lookup("DUALCITE_LOG") {
            config.log_filter = filter;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.narrative_fields.is_empty() {
            return Err(ConfigError::NoNarrativeFields);
        }
        if self.notification_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DUALCITE_NOTIFY_QUEUE",
                value: "0".into(),
                reason: "queue capacity must be positive".into(),
            });
        }
        Ok(())
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}
