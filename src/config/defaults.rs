pub(super) const DEFAULT_WORKER_COMMAND: &str = "python3 gps-connector.py";
pub(super) const WORKER_BINARY_ALLOWLIST: &[&str] = &["python3", "python", "fixbridge-worker"];
pub(super) const MAX_WORKER_ARGS: usize = 16;
pub(super) const MAX_WORKER_ARG_BYTES: usize = 4 * 1024;

pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
pub const DEFAULT_TERMINATE_GRACE_MS: u64 = 2_000;
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

pub(super) const MAX_RECONNECT_ATTEMPTS_LIMIT: u32 = 20;
pub(super) const MIN_CONNECT_TIMEOUT_MS: u64 = 1_000;
pub(super) const MAX_CONNECT_TIMEOUT_MS: u64 = 120_000;
pub(super) const MIN_LINE_BYTES: usize = 1024;
pub(super) const MAX_LINE_BYTES_LIMIT: usize = 1024 * 1024;
