// ── Core error types ──
//
// Transport errors from akari-api are carried verbatim: callers of the
// operation surface must be able to tell `Unauthorized` from
// `RemoteRejected` without string matching.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Device API errors (wrapped verbatim) ─────────────────────────
    #[error(transparent)]
    Api(#[from] akari_api::Error),

    // ── Resolution errors ────────────────────────────────────────────
    #[error("Unknown entry '{entry_id}': not a configured entry or a discovered device")]
    UnknownEntry { entry_id: String },

    #[error("Device '{device_id}' has not been discovered yet and no host is configured")]
    DeviceNotDiscovered { device_id: String },

    // ── Discovery errors ─────────────────────────────────────────────
    #[error("Invalid topic pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Subscription failed: {reason}")]
    Subscription { reason: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Supervisor is shutting down")]
    ShuttingDown,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// The wrapped device API error, if any.
    pub fn api(&self) -> Option<&akari_api::Error> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}
