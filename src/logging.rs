//! Global tracing subscriber setup.
//!
//! Verbosity is controlled by `RUST_LOG` (defaults to `info`). All `log::`
//! call sites across the crate (providers, MCP, skills) are forwarded into
//! the tracing pipeline via `LogTracer` rather than requiring every module
//! to be rewritten onto `tracing` directly.

use std::path::Path;
use std::sync::OnceLock;

static GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initialise the global tracing subscriber with a rolling daily log file
/// under `log_dir`.
pub fn init(log_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, "safeclaw.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = GUARD.set(guard);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .try_init()
        .ok();

    tracing_log::LogTracer::init().ok();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "SafeClaw started");
}
