//! Structured trace of the bridge's lifecycle, written as JSON lines.
//!
//! Only bridge targets are recorded: state transitions and worker process
//! lifecycle at `INFO`, plus per-token control-channel events at `DEBUG` when
//! `--log-content` is set.

use crate::config::AppConfig;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;

/// Every `ConnectionState` change.
pub(crate) const TRANSITION_TARGET: &str = "fixbridge::transition";
/// Worker spawn, exit and termination requests.
pub(crate) const WORKER_TARGET: &str = "fixbridge::worker";
/// One event per classified control-channel token.
pub(crate) const CONTROL_TARGET: &str = "fixbridge::control";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub(crate) fn tracing_log_path() -> PathBuf {
    env::var("FIXBRIDGE_TRACE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("fixbridge_trace.jsonl"))
}

/// Targets recorded in the trace file. Anything outside the bridge is dropped.
pub(crate) fn trace_targets(include_control: bool) -> Targets {
    let targets = Targets::new()
        .with_target(TRANSITION_TARGET, LevelFilter::INFO)
        .with_target(WORKER_TARGET, LevelFilter::INFO);
    if include_control {
        targets.with_target(CONTROL_TARGET, LevelFilter::DEBUG)
    } else {
        targets
    }
}

/// Install the JSON tracing subscriber used for bridge lifecycle events.
pub fn init_tracing(config: &AppConfig) {
    if !config.logging_enabled() {
        return;
    }
    let include_control = config.log_content;

    let _ = TRACING_INIT.get_or_init(|| {
        let path = tracing_log_path();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_current_span(false)
            .with_span_list(false)
            .with_filter(trace_targets(include_control));
        let subscriber = tracing_subscriber::registry().with(layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
