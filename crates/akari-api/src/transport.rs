// Shared transport configuration for building the reqwest::Client.
//
// One client is built per process and shared by every device; the
// per-device bits (base URL, API key) are applied per request.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How the optional API key is presented to the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiKeyHeader {
    /// `Authorization: Bearer <key>`.
    #[default]
    Bearer,
    /// `X-API-Key: <key>` (older firmware).
    XApiKey,
}

/// Retry behaviour for transient network failures.
///
/// Only connect/timeout failures are retried. An HTTP status, any status,
/// is an answer and is never retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Pause before each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Deadline for one attempt (connect + request + body).
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub api_key_header: ApiKeyHeader,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            api_key_header: ApiKeyHeader::default(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(concat!("akari/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))
    }
}
