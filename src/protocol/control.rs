/// Status and error tokens emitted on the worker's control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlToken {
    Connecting { address: String },
    Connected { detail: Option<String> },
    ConnectionLost { detail: Option<String> },
    Disconnected,
    ConnectionFailed { reason: String },
    BtError { reason: String },
    ParseError { snippet: String },
    Error { reason: String },
    FatalError { reason: String },
    /// Worker progress chatter (channel scans, retries, socket housekeeping).
    Progress { tag: String, detail: Option<String> },
    Unrecognized(String),
}

const PROGRESS_TAGS: &[&str] = &[
    "SCANNING_SERVICES",
    "FOUND_SERVICE",
    "CONNECT_ATTEMPT",
    "CONNECT_ERROR",
    "TRYING_CHANNEL",
    "TRYING_PORT",
    "TRYING_COMMON_PORTS",
    "RETRY_WAIT",
    "RELEASING_EXISTING",
    "BLUETOOTH_RESET",
    "SOCKET_CLOSED",
    "STREAMING",
    "DATA_TIMEOUT",
    "STREAM_ERROR",
    "SERVICE_SCAN_ERROR",
    "RESET_ERROR",
    "UNEXPECTED_ERROR",
    "IO_ERROR",
];

impl ControlToken {
    /// Classify one control-channel line. Unknown text maps to `Unrecognized`.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let (tag, detail) = match trimmed.split_once(':') {
            Some((tag, detail)) => (tag, Some(detail.trim())),
            None => (trimmed, None),
        };
        let owned = |detail: Option<&str>| detail.unwrap_or_default().to_string();
        let optional = |detail: Option<&str>| {
            detail
                .filter(|text| !text.is_empty())
                .map(|text| text.to_string())
        };

        match tag {
            "CONNECTING" => ControlToken::Connecting {
                address: owned(detail),
            },
            "CONNECTED" => ControlToken::Connected {
                detail: optional(detail),
            },
            "CONNECTION_LOST" => ControlToken::ConnectionLost {
                detail: optional(detail),
            },
            "DISCONNECTED" => ControlToken::Disconnected,
            "CONNECTION_FAILED" => ControlToken::ConnectionFailed {
                reason: owned(detail),
            },
            "BT_ERROR" => ControlToken::BtError {
                reason: owned(detail),
            },
            "PARSE_ERROR" => ControlToken::ParseError {
                snippet: owned(detail),
            },
            "ERROR" => ControlToken::Error {
                reason: owned(detail),
            },
            "FATAL_ERROR" => ControlToken::FatalError {
                reason: owned(detail),
            },
            _ if PROGRESS_TAGS.contains(&tag) => ControlToken::Progress {
                tag: tag.to_string(),
                detail: optional(detail),
            },
            _ => ControlToken::Unrecognized(trimmed.to_string()),
        }
    }

    /// Tokens that only feed the error counter.
    pub fn is_diagnostic(&self) -> bool {
        matches!(
            self,
            ControlToken::BtError { .. } | ControlToken::Error { .. } | ControlToken::FatalError { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ControlToken::Connecting { .. } => "connecting",
            ControlToken::Connected { .. } => "connected",
            ControlToken::ConnectionLost { .. } => "connection_lost",
            ControlToken::Disconnected => "disconnected",
            ControlToken::ConnectionFailed { .. } => "connection_failed",
            ControlToken::BtError { .. } => "bt_error",
            ControlToken::ParseError { .. } => "parse_error",
            ControlToken::Error { .. } => "error",
            ControlToken::FatalError { .. } => "fatal_error",
            ControlToken::Progress { .. } => "progress",
            ControlToken::Unrecognized(_) => "unrecognized",
        }
    }
}
