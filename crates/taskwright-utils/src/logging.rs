//! Process-wide structured logging init.
//!
//! This sets up the `tracing` subscriber used for operator-facing logs. It is
//! independent of the per-project `project.log` file the store writes (see
//! `taskwright_store::collab::FsProjectStore`) — that log is a persistent,
//! per-project audit trail; this is the operator's live console/JSON stream.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// `verbose` selects a debug-level filter with target/line info; otherwise
/// defaults to an info-level compact format. Respects `RUST_LOG` if set.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        if verbose {
            EnvFilter::try_new("taskwright=debug,info")
        } else {
            EnvFilter::try_new("taskwright=info,warn")
        }
    })?;

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_line_number(true).compact())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).compact())
            .try_init()?;
    }

    Ok(())
}
