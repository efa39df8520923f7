use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::fix::Fix;

/// Why a confirmed connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `CONNECTION_LOST` from the worker.
    ConnectionLost(Option<String>),
    /// `DISCONNECTED` from the worker.
    WorkerDisconnected,
    /// `CONNECTION_FAILED` after the link was up.
    ConnectionFailed(String),
    /// Worker process exited without a clean token.
    WorkerExited(Option<i32>),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ConnectionLost(Some(detail)) => write!(f, "connection lost: {detail}"),
            DisconnectReason::ConnectionLost(None) => f.write_str("connection lost"),
            DisconnectReason::WorkerDisconnected => f.write_str("worker disconnected"),
            DisconnectReason::ConnectionFailed(reason) => write!(f, "connection failed: {reason}"),
            DisconnectReason::WorkerExited(Some(code)) => write!(f, "worker exited with code {code}"),
            DisconnectReason::WorkerExited(None) => f.write_str("worker killed by signal"),
        }
    }
}

/// Connection lifecycle. Only the state machine moves between these.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected {
        reason: DisconnectReason,
    },
    ReconnectWaiting {
        attempt: u32,
        delay: Duration,
    },
    /// Terminal for the session. `exhausted` is false when auto-reconnect was off.
    Failed {
        exhausted: bool,
    },
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected { .. } => "disconnected",
            ConnectionState::ReconnectWaiting { .. } => "reconnect_waiting",
            ConnectionState::Failed { .. } => "failed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected { reason } => write!(f, "disconnected ({reason})"),
            ConnectionState::ReconnectWaiting { attempt, delay } => write!(
                f,
                "reconnect_waiting (attempt {attempt}, {} ms)",
                delay.as_millis()
            ),
            ConnectionState::Failed { exhausted } => write!(f, "failed (exhausted: {exhausted})"),
            other => f.write_str(other.label()),
        }
    }
}

/// One logical connection sequence to a single device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub device_address: String,
    pub auto_reconnect: bool,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
}

impl Session {
    pub fn new(device_address: String, auto_reconnect: bool, max_reconnect_attempts: u32) -> Self {
        Self {
            device_address,
            auto_reconnect,
            reconnect_attempts: 0,
            max_reconnect_attempts,
        }
    }
}

/// Raw counters kept by the state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub total_updates: u64,
    pub errors: u64,
    pub parse_errors: u64,
    /// Epoch millis of the most recent transition into `Connected`.
    pub connection_time: Option<i64>,
    /// Epoch millis of the most recent accepted fix.
    pub last_update_time: Option<i64>,
}

impl SessionStats {
    /// Derive the public view. `live` is true while the link is up.
    pub fn snapshot(&self, now_ms: i64, live: bool, current_fix: Option<Fix>) -> StatsSnapshot {
        let uptime_ms = match (live, self.connection_time) {
            (true, Some(since)) => now_ms.saturating_sub(since).max(0) as u64,
            _ => 0,
        };
        let updates_per_second = if uptime_ms > 0 {
            self.total_updates as f64 / (uptime_ms as f64 / 1000.0)
        } else {
            0.0
        };
        StatsSnapshot {
            total_updates: self.total_updates,
            last_update_time: self.last_update_time,
            connection_time: self.connection_time,
            uptime_ms,
            updates_per_second,
            errors: self.errors,
            parse_errors: self.parse_errors,
            current_location: current_fix,
        }
    }
}

/// Statistics returned by [`super::Bridge::stats`] and carried in `disconnected`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_updates: u64,
    pub last_update_time: Option<i64>,
    pub connection_time: Option<i64>,
    pub uptime_ms: u64,
    pub updates_per_second: f64,
    pub errors: u64,
    pub parse_errors: u64,
    pub current_location: Option<Fix>,
}

/// Connection summary returned by [`super::Bridge::connection_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub connected: bool,
    pub device_address: Option<String>,
    pub has_location: bool,
    pub last_update: Option<i64>,
    pub connection_time: Option<i64>,
    pub auto_reconnect: bool,
    pub reconnect_attempts: u32,
}

/// Point-in-time copy of everything the accessors expose.
#[derive(Debug, Clone, Default)]
pub(crate) struct Shared {
    pub(crate) state: ConnectionState,
    pub(crate) session: Option<Session>,
    pub(crate) stats: SessionStats,
    pub(crate) current_fix: Option<Fix>,
}

impl Shared {
    pub(crate) fn connection_info(&self) -> ConnectionInfo {
        let session = self.session.as_ref();
        ConnectionInfo {
            connected: self.state.is_connected(),
            device_address: session.map(|session| session.device_address.clone()),
            has_location: self.current_fix.is_some(),
            last_update: self.stats.last_update_time,
            connection_time: self.stats.connection_time,
            auto_reconnect: session.is_some_and(|session| session.auto_reconnect),
            reconnect_attempts: session.map_or(0, |session| session.reconnect_attempts),
        }
    }

    pub(crate) fn stats_snapshot(&self, now_ms: i64) -> StatsSnapshot {
        self.stats
            .snapshot(now_ms, self.state.is_connected(), self.current_fix)
    }
}
