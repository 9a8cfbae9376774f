use thiserror::Error;

/// Top-level error type for the `akari-api` crate.
///
/// Every variant is a distinct outcome the caller can branch on. Nothing
/// here is ever folded into a default value by the client: a failed read is
/// an error, not an empty section.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Connect or timeout failure, after the single transient retry.
    #[error("Device at {url} is unreachable: {reason}")]
    Unreachable {
        url: String,
        reason: String,
        timed_out: bool,
    },

    /// Client construction or a non-retryable request failure.
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// Host/port did not form a valid control-plane URL.
    #[error("Invalid device URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Authentication ──────────────────────────────────────────────
    /// 401 or 403 from the device.
    #[error("Unauthorized (HTTP {status}): check the device API key")]
    Unauthorized { status: u16 },

    // ── Local validation ────────────────────────────────────────────
    /// Section name outside the fixed set. Raised before any I/O.
    #[error("Invalid config section '{name}' (expected one of: {})", crate::models::SectionName::names())]
    InvalidSection { name: String },

    // ── Remote ──────────────────────────────────────────────────────
    /// The device answered with a 4xx other than 401/403.
    #[error("Request rejected by device (HTTP {status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// The device answered with a 5xx.
    #[error("Device fault (HTTP {status}): {message}")]
    RemoteFault { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// Response body failed to parse, with the raw body for debugging.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String, body: String },
}

impl Error {
    /// Returns `true` for failures a single retry may resolve.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    /// Returns `true` if the device refused our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// The HTTP status the device answered with, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status }
            | Self::RemoteRejected { status, .. }
            | Self::RemoteFault { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn malformed(message: impl std::fmt::Display, body: &str) -> Self {
        let preview = preview(body);
        Self::MalformedResponse {
            message: format!("{message} (body preview: {preview:?})"),
            body: body.to_owned(),
        }
    }
}

/// First 200 characters of a response body, for error messages.
pub(crate) fn preview(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
