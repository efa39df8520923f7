use std::fmt;

use crate::worker::SpawnError;

/// Errors surfaced to callers of [`super::Bridge::start`].
#[derive(Debug)]
pub enum BridgeError {
    /// Address is not six colon-separated hex pairs.
    InvalidAddressFormat(String),
    /// A session is already running; stop it first.
    AlreadyConnected,
    /// The worker executable could not be started.
    Spawn(SpawnError),
    /// The worker did not confirm a connection in time.
    ConnectTimeout,
    /// The worker reported that it could not connect.
    ConnectionFailed(String),
    /// The worker exited before confirming a connection.
    WorkerExited(Option<i32>),
    /// `stop()` was called while `start()` was still waiting.
    Cancelled,
    /// The bridge's state machine is no longer running.
    BridgeClosed,
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::InvalidAddressFormat(address) => {
                write!(f, "invalid device address format: '{address}'")
            }
            BridgeError::AlreadyConnected => f.write_str("a session is already active"),
            BridgeError::Spawn(err) => write!(f, "{err}"),
            BridgeError::ConnectTimeout => f.write_str("timed out waiting for the device to connect"),
            BridgeError::ConnectionFailed(reason) => write!(f, "connection failed: {reason}"),
            BridgeError::WorkerExited(Some(code)) => {
                write!(f, "worker exited with code {code} before connecting")
            }
            BridgeError::WorkerExited(None) => {
                f.write_str("worker was killed by a signal before connecting")
            }
            BridgeError::Cancelled => f.write_str("start cancelled by stop"),
            BridgeError::BridgeClosed => f.write_str("bridge is shut down"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SpawnError> for BridgeError {
    fn from(err: SpawnError) -> Self {
        BridgeError::Spawn(err)
    }
}
