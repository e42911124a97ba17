use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `scenepilot-api` crate.
///
/// Covers every failure mode of the control-surface session:
/// address resolution, connection setup, handshake, request correlation,
/// and frame decoding. `scenepilot-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection setup ────────────────────────────────────────────
    /// The configured host/port do not form a valid WebSocket address.
    #[error("Invalid control surface address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The socket could not be opened within `connect_timeout`.
    #[error("Connection to {url} timed out after {}ms", timeout.as_millis())]
    ConnectTimeout { url: String, timeout: Duration },

    /// The socket could not be opened (refused, DNS failure, upgrade rejected).
    #[error("Connection to {url} failed: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Hello/Identify/Identified exchange did not complete.
    #[error("Handshake failed: {reason}")]
    Handshake { reason: String },

    // ── Session ─────────────────────────────────────────────────────
    /// Operation requires a live session.
    #[error("Not connected to the control surface")]
    NotConnected,

    /// The background reconnect loop currently owns the session.
    #[error("Reconnection already in progress")]
    ReconnectInProgress,

    /// The session dropped while a request was outstanding.
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    // ── Requests ────────────────────────────────────────────────────
    /// No matching `RequestResponse` arrived in time.
    #[error("Request {request_type} ({request_id}) timed out after {}ms", timeout.as_millis())]
    RequestTimeout {
        request_type: String,
        request_id: String,
        timeout: Duration,
    },

    /// The surface answered with a non-success request status.
    #[error("Request {request_type} rejected (code {code}): {}", comment.as_deref().unwrap_or("no comment"))]
    RequestFailed {
        request_type: String,
        code: u16,
        comment: Option<String>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// Malformed or unexpected frame from the surface.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON encode/decode failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Low-level WebSocket failure after the session was established.
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

impl Error {
    /// Returns `true` if the error means the session itself is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. }
                | Self::ConnectionFailed { .. }
                | Self::Handshake { .. }
                | Self::NotConnected
                | Self::ConnectionLost { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if retrying the same operation later may succeed.
    ///
    /// The transport never retries on its own; this is a hint for callers.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestTimeout { .. } | Self::ReconnectInProgress => true,
            Self::InvalidAddress { .. }
            | Self::RequestFailed { .. }
            | Self::Protocol(_)
            | Self::Serialization(_) => false,
            other => other.is_connection_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_timeout_is_transient_but_not_connection_error() {
        let err = Error::RequestTimeout {
            request_type: "GetVersion".into(),
            request_id: "7".into(),
            timeout: Duration::from_millis(250),
        };
        assert!(err.is_transient());
        assert!(!err.is_connection_error());
        assert_eq!(
            err.to_string(),
            "Request GetVersion (7) timed out after 250ms"
        );
    }

    #[test]
    fn invalid_address_is_permanent() {
        let err = Error::InvalidAddress {
            address: "ws://bad host:1".into(),
            reason: "invalid domain character".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn request_failed_message_includes_comment() {
        let err = Error::RequestFailed {
            request_type: "SetCurrentProgramScene".into(),
            code: 600,
            comment: Some("No source was found".into()),
        };
        assert_eq!(
            err.to_string(),
            "Request SetCurrentProgramScene rejected (code 600): No source was found"
        );
    }
}
