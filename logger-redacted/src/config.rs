// Logger configuration
use serde::{Deserialize, Serialize};

use crate::redactor::RedactionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Default filter directive, overridden by `RUST_LOG` when set
    pub log_level: String,
    pub format: LogFormat,
    pub with_target: bool,
    /// Applied to every formatted line before it is written
    pub redaction: RedactionConfig,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
            with_target: true,
            redaction: RedactionConfig::default(),
        }
    }
}

impl LoggerConfig {
    /// Read `LOG_LEVEL`, `LOG_FORMAT` and `LOG_HASH_PII`, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut redaction = defaults.redaction;
        if let Ok(raw) = std::env::var("LOG_HASH_PII") {
            redaction.hash_for_correlation = !matches!(raw.to_ascii_lowercase().as_str(), "0" | "false" | "no");
        }

        Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.format),
            with_target: defaults.with_target,
            redaction,
        }
    }
}
