//! Tracing initialisation and redaction helpers
//!
//! Identity services handle phone numbers, passwords and bearer tokens on
//! almost every call path. Nothing in that set may reach a log line or an
//! audit record in clear text. This crate owns the subscriber setup for
//! binaries and the helpers the services use to mask values before they are
//! attached to tracing fields. Output installed by [`init_tracing`] also
//! passes through a [`PiiRedactor`] as a last line of masking.
//!
//! # Example
//!
//! ```rust,no_run
//! use logger_redacted::{init_tracing, redact_phone, LoggerConfig};
//!
//! init_tracing(&LoggerConfig::from_env()).ok();
//! tracing::warn!(phone = %redact_phone("+2348012345678"), "Login rejected");
//! ```

pub mod config;
pub mod redactor;
pub mod writer;

pub use config::*;
pub use redactor::*;
pub use writer::*;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Subscriber already initialised: {0}")]
    Init(String),
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `config.log_level`.
pub fn init_tracing(config: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| LoggerError::InvalidFilter(e.to_string()))?,
    };

    let writer = RedactingMakeWriter::new(std::io::stdout, PiiRedactor::new(config.redaction.clone()));
    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(config.with_target).with_writer(writer))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(config.with_target).with_writer(writer))
            .try_init(),
    };

    result.map_err(|e| LoggerError::Init(e.to_string()))
}
