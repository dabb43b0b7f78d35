//! Log subscriber setup
//!
//! The library only emits `tracing` events; binaries and tests call
//! [`init_tracing`] once to get them printed. `RUST_LOG` selects levels
//! (default `info`).

use std::str::FromStr;

use restline_common::ApiError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(ApiError::Config(format!("unknown log format '{other}'"))),
        }
    }
}

/// Install a global subscriber.
///
/// Returns `false` if one was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).try_init().is_ok(),
        LogFormat::Json => {
            registry.with(tracing_subscriber::fmt::layer().json()).try_init().is_ok()
        }
    }
}
