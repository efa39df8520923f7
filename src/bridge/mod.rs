//! Session bridge: turns a worker's line output into validated fixes and
//! connection events, reconnecting with exponential backoff when the link drops.

mod backoff;
mod error;
mod events;
mod facade;
mod machine;
mod state;

pub use backoff::ReconnectPolicy;
pub use error::BridgeError;
pub use events::{BridgeEvent, BridgeObserver};
pub use facade::Bridge;
pub use state::{
    ConnectionInfo, ConnectionState, DisconnectReason, Session, SessionStats, StatsSnapshot,
};
