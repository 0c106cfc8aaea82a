//! Process-wide log setup for the Codecheck daemon.
//!
//! `RUST_LOG` wins when set. Otherwise the requested level applies to
//! Codecheck's own crates and HTTP plumbing is held at `warn` so request
//! traces do not drown lifecycle events.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose chatter is capped at `warn` by the default filter.
const QUIET_CRATES: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Line format of emitted log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON, one object per event.
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Filter directives used when `RUST_LOG` is absent.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec![level];
    directives.extend(QUIET_CRATES.iter().map(|krate| format!("{krate}=warn")));
    directives.join(",")
}

/// Install the global subscriber. A second call is a no-op because the
/// global subscriber can only be set once.
pub fn init_tracing(format: LogFormat, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_target(false).json())
            .try_init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
