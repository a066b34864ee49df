//! # Global subscriber installation.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and a `fmt`
//! layer: human-readable for development, JSON lines for production.

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, colored output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = InitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "console" | "dev" => Ok(LogFormat::Pretty),
            "json" | "prod" => Ok(LogFormat::Json),
            other => Err(InitError::Format(other.to_string())),
        }
    }
}

/// Errors raised while installing the global subscriber.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InitError {
    #[error("invalid log filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },

    #[error("unknown log format {0:?}")]
    Format(String),

    /// An environment variable holds an unparsable value.
    #[error("invalid value {value:?} for {key}")]
    Env { key: String, value: String },

    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Subscriber(String),
}

impl InitError {
    pub fn as_label(&self) -> &'static str {
        match self {
            InitError::Filter { .. } => "init_filter",
            InitError::Format(_) => "init_format",
            InitError::Env { .. } => "init_env",
            InitError::Subscriber(_) => "init_subscriber",
        }
    }
}

/// Installs the global `tracing` subscriber.
///
/// Fails with [`InitError::Subscriber`] if one is already installed.
pub fn init(format: LogFormat, filter: &str) -> Result<(), InitError> {
    let env_filter = EnvFilter::try_new(filter).map_err(|e| InitError::Filter {
        filter: filter.to_string(),
        reason: e.to_string(),
    })?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let res = match format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };
    res.map_err(|e| InitError::Subscriber(e.to_string()))
}
