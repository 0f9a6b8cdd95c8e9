//! Process-wide tracing setup.
//!
//! `RUST_LOG` selects the filter (default `info`). Records emitted through
//! the `log` facade, as the database layer does, are bridged into tracing.

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

pub const DEFAULT_FILTER: &str = "info";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to bridge log records: {0}")]
    Bridge(#[from] log::SetLoggerError),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(format: LogFormat) -> Result<(), LoggingError> {
    tracing_log::LogTracer::init()?;

    let output: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Text => fmt::layer().with_thread_names(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_thread_names(true).boxed(),
    };
    let subscriber = Registry::default().with(output).with(env_filter());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
