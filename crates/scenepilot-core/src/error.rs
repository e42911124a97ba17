// ── Core error types ──
//
// Domain-level errors from scenepilot-core. Callers never see raw protocol
// frames or JSON failures; the `From<scenepilot_api::Error>` impl folds
// transport failures into the variants below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to control surface at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Handshake with control surface failed: {reason}")]
    HandshakeFailed { reason: String },

    #[error("Control surface disconnected")]
    ControllerDisconnected,

    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    // ── Scene errors ─────────────────────────────────────────────────
    #[error("Scene not found: {name}")]
    SceneNotFound { name: String },

    #[error("Request {request_type} rejected by control surface (code {code}): {message}")]
    RequestRejected {
        request_type: String,
        code: u16,
        message: String,
    },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Cannot load mapping configuration from {path}: {message}")]
    ConfigLoad { path: String, message: String },

    #[error("Invalid emotion context: {message}")]
    InvalidContext { message: String },

    #[error("Invalid mapping for '{emotion}': {message}")]
    InvalidMapping { emotion: String, message: String },

    #[error("Invalid feedback: {message}")]
    InvalidFeedback { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the failure came from the session rather than the request.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::HandshakeFailed { .. }
                | Self::ControllerDisconnected
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<scenepilot_api::Error> for CoreError {
    fn from(err: scenepilot_api::Error) -> Self {
        use scenepilot_api::Error as Api;

        match err {
            Api::InvalidAddress { address, reason } => CoreError::ConnectionFailed {
                url: address,
                reason: format!("invalid address: {reason}"),
            },
            Api::ConnectTimeout { url, timeout } => CoreError::Timeout {
                operation: format!("connecting to {url}"),
                timeout_ms: duration_ms(timeout),
            },
            Api::ConnectionFailed { url, reason } => CoreError::ConnectionFailed { url, reason },
            Api::Handshake { reason } => CoreError::HandshakeFailed { reason },
            Api::NotConnected | Api::ReconnectInProgress | Api::ConnectionLost { .. } => {
                CoreError::ControllerDisconnected
            }
            Api::WebSocket(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            Api::RequestTimeout {
                request_type,
                timeout,
                ..
            } => CoreError::Timeout {
                operation: request_type,
                timeout_ms: duration_ms(timeout),
            },
            Api::RequestFailed {
                request_type,
                code,
                comment,
            } => CoreError::RequestRejected {
                request_type,
                code,
                message: comment.unwrap_or_else(|| "no comment".into()),
            },
            Api::Protocol(message) => CoreError::Protocol { message },
            Api::Serialization(e) => CoreError::Protocol {
                message: e.to_string(),
            },
        }
    }
}

fn duration_ms(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
