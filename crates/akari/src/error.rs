//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a stable exit code per failure class.

use miette::Diagnostic;
use thiserror::Error;

use akari_config::ConfigError;
use akari_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 5;
    pub const DEVICE_FAULT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to device at {url}")]
    #[diagnostic(
        code(akari::connection_failed),
        help(
            "Check that the device is powered and its service is running.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Device at {url} did not answer in time")]
    #[diagnostic(
        code(akari::timeout),
        help("Increase the timeout with --timeout or `defaults.timeout`.")
    )]
    Timeout { url: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Device refused the API key")]
    #[diagnostic(
        code(akari::auth_failed),
        help(
            "Pass --api-key, set `api_key_env` on the entry, or export AKARI_API_KEY.\n\
             Use `--api-key` together with `akari probe` to test a key."
        )
    )]
    AuthFailed,

    #[error("Entry '{entry}' reads its API key from ${var}, which is not set")]
    #[diagnostic(
        code(akari::no_credentials),
        help("Export {var}, or add a plaintext `api_key` to the entry.")
    )]
    NoCredentials { entry: String, var: String },

    // ── Targets ──────────────────────────────────────────────────────
    #[error("No target device")]
    #[diagnostic(
        code(akari::no_target),
        help(
            "Pick one with --entry NAME or --host ADDR [--port N].\n\
             Configured entries: {available}"
        )
    )]
    NoTarget { available: String },

    #[error("Entry '{entry}' not found")]
    #[diagnostic(
        code(akari::not_found),
        help("Configured entries: {available}\nConfig file: {path}")
    )]
    NotFound {
        entry: String,
        available: String,
        path: String,
    },

    #[error("Device '{device_id}' has no known address")]
    #[diagnostic(
        code(akari::not_discovered),
        help(
            "The entry follows discovery, which one-shot commands do not run.\n\
             Add `host` to the entry, or pass --host."
        )
    )]
    NotDiscovered { device_id: String },

    // ── Device answers ───────────────────────────────────────────────
    #[error("Device rejected the request (HTTP {status}): {message}")]
    #[diagnostic(code(akari::rejected))]
    Rejected { status: u16, message: String },

    #[error("Device fault (HTTP {status}): {message}")]
    #[diagnostic(
        code(akari::device_fault),
        help("Inspect the device service logs; `akari restart` may help.")
    )]
    DeviceFault { status: u16, message: String },

    #[error("Device sent a response akari could not read: {message}")]
    #[diagnostic(
        code(akari::malformed),
        help("Run with -vv to log the raw exchange; the firmware may be too old.")
    )]
    Malformed { message: String },

    #[error("{0}")]
    #[diagnostic(code(akari::transport))]
    Transport(String),

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(akari::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found")]
    #[diagnostic(code(akari::no_config), help("Expected at: {path}"))]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(akari::config))]
    Config(Box<figment::Error>),

    // ── Supervisor ───────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(akari::supervisor))]
    Supervisor(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(akari::json), help("Check the JSON contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Could not render output: {0}")]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::NotDiscovered { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::DeviceFault { .. } => exit_code::DEVICE_FAULT,
            Self::NoTarget { .. }
            | Self::Validation { .. }
            | Self::NoConfig { .. }
            | Self::Config(_)
            | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Library error mapping ────────────────────────────────────────────

impl From<akari_api::Error> for CliError {
    fn from(err: akari_api::Error) -> Self {
        use akari_api::Error as Api;

        match err {
            Api::Unreachable {
                url,
                timed_out: true,
                ..
            } => Self::Timeout { url },
            Api::Unreachable { url, reason, .. } => Self::ConnectionFailed { url, reason },
            Api::Unauthorized { .. } => Self::AuthFailed,
            Api::InvalidSection { name } => Self::Validation {
                field: "section".into(),
                reason: format!(
                    "'{name}' is not a section (expected one of: {})",
                    akari_api::SectionName::names()
                ),
            },
            Api::RemoteRejected { status, message } => Self::Rejected { status, message },
            Api::RemoteFault { status, message } => Self::DeviceFault { status, message },
            Api::MalformedResponse { message, .. } => Self::Malformed { message },
            Api::InvalidUrl(e) => Self::Validation {
                field: "host".into(),
                reason: e.to_string(),
            },
            Api::Transport(message) => Self::Transport(message),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Api(e) => e.into(),
            CoreError::UnknownEntry { entry_id } => Self::NotFound {
                entry: entry_id,
                available: "(see config file)".into(),
                path: akari_config::config_path().display().to_string(),
            },
            CoreError::DeviceNotDiscovered { device_id } => Self::NotDiscovered { device_id },
            CoreError::InvalidPattern { pattern, reason } => Self::Validation {
                field: "topic".into(),
                reason: format!("'{pattern}': {reason}"),
            },
            CoreError::Config { message } => Self::Validation {
                field: "entry".into(),
                reason: message,
            },
            other @ (CoreError::Subscription { .. } | CoreError::ShuttingDown) => {
                Self::Supervisor(other.to_string())
            }
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { entry, var } => Self::NoCredentials { entry, var },
            ConfigError::Figment(e) => Self::Config(e),
        }
    }
}
