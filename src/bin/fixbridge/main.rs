//! fixbridge entrypoint: connect to one device and print its fixes as JSON lines.
//!
//! Every bridge event is written to stdout as a single JSON object tagged with
//! an `event` field. Diagnostics go to the debug log (`--logs`), never stdout.

mod signals;

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use fixbridge::config::AppConfig;
use fixbridge::{
    init_logging, init_tracing, log_debug, log_debug_content, log_file_path, log_panic, Bridge,
    BridgeEvent, ConnectionState,
};
use std::io::{self, Write};
use std::panic;
use std::time::Duration;

use crate::signals::{install_shutdown_handlers, shutdown_requested};

/// How often the event loop checks for a shutdown signal.
const SHUTDOWN_POLL_MS: u64 = 100;

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    init_tracing(&config);
    install_panic_hook();
    log_debug("=== fixbridge started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));
    log_debug(&format!(
        "worker: {} {:?}",
        config.worker_cmd, config.worker_args
    ));

    let bridge = Bridge::with_process_worker(config.bridge_config());
    let events = bridge.subscribe();

    if let Err(err) = bridge.start(&config.address, config.auto_reconnect()) {
        log_debug(&format!("start failed: {err}"));
        return Err(anyhow!("could not connect to {}: {err}", config.address));
    }
    install_shutdown_handlers()?;

    let outcome = run_event_loop(&bridge, &events);
    let _ = bridge.stop();
    log_debug("=== fixbridge exiting ===");
    outcome
}

fn run_event_loop(bridge: &Bridge, events: &Receiver<BridgeEvent>) -> Result<()> {
    let poll = Duration::from_millis(SHUTDOWN_POLL_MS);
    loop {
        if shutdown_requested() {
            log_debug("shutdown requested");
            return Ok(());
        }
        match events.recv_timeout(poll) {
            Ok(event) => {
                print_event(&event)?;
                if let BridgeEvent::ReconnectFailed { attempts } = event {
                    return Err(anyhow!("gave up after {attempts} reconnect attempts"));
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // Without auto-reconnect the session ends with no reconnect_failed event.
                if let ConnectionState::Failed { exhausted: false } = bridge.state() {
                    while let Ok(event) = events.recv_timeout(poll) {
                        print_event(&event)?;
                    }
                    return Err(anyhow!("connection ended"));
                }
            }
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}

fn print_event(event: &BridgeEvent) -> Result<()> {
    let line = serde_json::to_string(event)?;
    log_debug_content(&format!("event: {line}"));
    let mut out = io::stdout().lock();
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        log_debug(&format!("panic at {location}"));
        previous(info);
    }));
}
