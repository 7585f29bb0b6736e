//! Global tracing subscriber for the `infradraft` binary.
//!
//! Logs go to stderr so stdout stays free for the review prompt and the
//! `--json` run report.

use tracing::{debug, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default level for the `--verbose` flag.
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the subscriber: `RUST_LOG` if set, else `level`; JSON lines when
/// `json` is true. Later calls leave the first subscriber in place.
pub fn init_tracing(json: bool, level: Level) {
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let installed = if json {
        tracing_subscriber::registry()
            .with(env_filter(level))
            .with(layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter(level))
            .with(layer)
            .try_init()
    };
    if installed.is_err() {
        debug!("tracing subscriber already installed");
    }
}
