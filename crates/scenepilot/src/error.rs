//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use scenepilot_config::ConfigError;
use scenepilot_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to the control surface at {url}")]
    #[diagnostic(
        code(scenepilot::connection_failed),
        help(
            "Check that the production app is running with its WebSocket server enabled.\n\
             Reason: {reason}\n\
             Override the address with --host / --port."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Handshake with the control surface failed")]
    #[diagnostic(
        code(scenepilot::handshake_failed),
        help(
            "{reason}\n\
             If the server requires authentication, pass --auth-token or set\n\
             auth_token_env in the [surface] section of the config."
        )
    )]
    HandshakeFailed { reason: String },

    #[error("Lost the connection to the control surface")]
    #[diagnostic(code(scenepilot::disconnected))]
    Disconnected,

    #[error("Timed out after {timeout_ms}ms: {operation}")]
    #[diagnostic(
        code(scenepilot::timeout),
        help("Raise response_timeout_secs in the [surface] section or check the app's load.")
    )]
    Timeout { operation: String, timeout_ms: u64 },

    // ── Scenes ───────────────────────────────────────────────────────
    #[error("Scene '{name}' not found")]
    #[diagnostic(
        code(scenepilot::scene_not_found),
        help("Run: scenepilot scenes list")
    )]
    SceneNotFound { name: String },

    #[error("The control surface rejected {request_type} (code {code}): {message}")]
    #[diagnostic(code(scenepilot::rejected))]
    Rejected {
        request_type: String,
        code: u16,
        message: String,
    },

    #[error("Protocol error: {message}")]
    #[diagnostic(code(scenepilot::protocol))]
    Protocol { message: String },

    // ── Mappings ─────────────────────────────────────────────────────
    #[error("Cannot load mapping file {path}")]
    #[diagnostic(
        code(scenepilot::mapping_file),
        help(
            "{message}\n\
             Fix the file, or restore the built-in table with: scenepilot mappings reset --all"
        )
    )]
    MappingFile { path: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(scenepilot::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists")]
    #[diagnostic(
        code(scenepilot::config_exists),
        help(
            "Found: {path}\n\
             Use --force to overwrite it."
        )
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(scenepilot::config),
        help("Inspect the effective configuration with: scenepilot config show")
    )]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(scenepilot::json))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(scenepilot::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::HandshakeFailed { .. } => exit_code::AUTH,
            Self::SceneNotFound { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::HandshakeFailed { reason } => CliError::HandshakeFailed { reason },

            CoreError::ControllerDisconnected => CliError::Disconnected,

            CoreError::Timeout {
                operation,
                timeout_ms,
            } => CliError::Timeout {
                operation,
                timeout_ms,
            },

            CoreError::SceneNotFound { name } => CliError::SceneNotFound { name },

            CoreError::RequestRejected {
                request_type,
                code,
                message,
            } => CliError::Rejected {
                request_type,
                code,
                message,
            },

            CoreError::Protocol { message } => CliError::Protocol { message },

            CoreError::ConfigLoad { path, message } => CliError::MappingFile { path, message },

            CoreError::InvalidContext { message } => CliError::Validation {
                field: "observation".into(),
                reason: message,
            },

            CoreError::InvalidMapping { emotion, message } => CliError::Validation {
                field: format!("mapping '{emotion}'"),
                reason: message,
            },

            CoreError::InvalidFeedback { message } => CliError::Validation {
                field: "satisfaction".into(),
                reason: message,
            },

            CoreError::Io(e) => CliError::Io(e),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<scenepilot_api::Error> for CliError {
    fn from(err: scenepilot_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
