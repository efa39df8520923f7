pub mod address;
pub mod app;
pub mod bridge;
pub mod config;
pub mod fix;
mod lock;
pub mod protocol;
mod telemetry;
pub mod worker;

pub(crate) use lock::lock_or_recover;
pub use app::logging::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
pub use bridge::{
    Bridge, BridgeError, BridgeEvent, BridgeObserver, ConnectionInfo, ConnectionState,
    StatsSnapshot,
};
pub use fix::Fix;
pub use telemetry::init_tracing;
