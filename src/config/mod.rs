//! Command-line parsing, validation, and the bridge tuning knobs.

mod defaults;
mod validation;

use clap::Parser;
use std::time::Duration;

use defaults::DEFAULT_WORKER_COMMAND;
pub use defaults::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_MAX_LINE_BYTES, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_TERMINATE_GRACE_MS,
};

/// CLI options for the `fixbridge` binary. Validated values keep the worker subprocess safe.
#[derive(Debug, Parser, Clone)]
#[command(about = "fixbridge: stream location fixes from a paired device", author, version)]
pub struct AppConfig {
    /// Device address to connect to (XX:XX:XX:XX:XX:XX)
    #[arg(value_name = "ADDRESS")]
    pub address: String,

    /// Worker command line; the device address is appended as the last argument
    #[arg(long = "worker", env = "FIXBRIDGE_WORKER", default_value = DEFAULT_WORKER_COMMAND)]
    pub worker: String,

    /// Give up after the first disconnect instead of reconnecting
    #[arg(long = "no-auto-reconnect", default_value_t = false)]
    pub no_auto_reconnect: bool,

    /// Reconnect attempts before the session is declared failed
    #[arg(long = "max-reconnect-attempts", default_value_t = DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    pub max_reconnect_attempts: u32,

    /// Time allowed for the worker to confirm a connection (milliseconds)
    #[arg(long = "connect-timeout-ms", default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,

    /// Longest line accepted from the worker before it is dropped (bytes)
    #[arg(long = "max-line-bytes", default_value_t = DEFAULT_MAX_LINE_BYTES)]
    pub max_line_bytes: usize,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "FIXBRIDGE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "FIXBRIDGE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging raw worker lines and coordinates (debug log only)
    #[arg(
        long = "log-content",
        env = "FIXBRIDGE_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Worker executable resolved by `validate`
    #[arg(skip)]
    pub worker_cmd: String,

    /// Worker arguments resolved by `validate`
    #[arg(skip)]
    pub worker_args: Vec<String>,
}

impl AppConfig {
    pub fn logging_enabled(&self) -> bool {
        self.logs && !self.no_logs
    }

    pub fn auto_reconnect(&self) -> bool {
        !self.no_auto_reconnect
    }

    /// Build the bridge configuration. Call after `validate`.
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            worker_cmd: self.worker_cmd.clone(),
            worker_args: self.worker_args.clone(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            max_line_bytes: self.max_line_bytes,
            ..BridgeConfig::default()
        }
    }
}

/// Tunable parameters for one bridge instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub worker_cmd: String,
    pub worker_args: Vec<String>,
    pub max_reconnect_attempts: u32,
    pub connect_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub terminate_grace: Duration,
    pub max_line_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            worker_cmd: "python3".to_string(),
            worker_args: vec!["gps-connector.py".to_string()],
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            terminate_grace: Duration::from_millis(DEFAULT_TERMINATE_GRACE_MS),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}
