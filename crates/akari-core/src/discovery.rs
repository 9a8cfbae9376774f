// ── Discovery listener ──
//
// Consumes a retained-message subscription, validates each announcement
// and hands `DiscoveryEvent`s to a sink. Bad input is logged and dropped;
// the loop only ends on cancellation (or an exhausted retry budget).

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use akari_api::DeviceIdentity;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::CoreError;
use crate::model::{Announcement, DeviceMetadata};
use crate::topic::TopicPattern;

/// One message from the subscription transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retained: bool,
}

/// What the listener concluded from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Announced(Announcement),
    Removed { device_id: String },
}

/// How a device removal is signalled on the discovery topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalPolicy {
    /// Discovery never removes devices; empty payloads are ignored.
    #[default]
    Ignore,
    /// An empty (or whitespace-only) payload removes the device.
    EmptyPayload,
}

/// A subscription transport (an MQTT client, a test fixture...).
///
/// `subscribe` may be called again after the previous stream ended; the
/// transport is expected to replay retained messages on each subscription.
pub trait MessageSource: Send {
    type Stream: Stream<Item = InboundMessage> + Send + Unpin + 'static;

    fn subscribe(
        &mut self,
        filter: &str,
    ) -> impl Future<Output = Result<Self::Stream, CoreError>> + Send;
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff for re-subscribing after the stream ends.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first re-subscription. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

impl ReconnectConfig {
    /// Delay before attempt number `attempt` (0-based), doubling up to
    /// `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

// ── Payload parsing ──────────────────────────────────────────────────

/// Why an announcement was dropped.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing host (expected 'host' or 'ip')")]
    MissingHost,

    #[error("missing port")]
    MissingPort,

    #[error("invalid port {0}")]
    InvalidPort(String),

    #[error("payload device_id '{payload}' does not match topic segment '{topic}'")]
    DeviceIdMismatch { topic: String, payload: String },
}

#[derive(Deserialize)]
struct InfoPayload {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    port: Option<Value>,
    #[serde(default)]
    firmware_version: Option<String>,
    #[serde(default)]
    capabilities: Option<BTreeSet<String>>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
}

/// Parse a retained info payload published under `device_id`'s topic.
pub fn parse_announcement(device_id: &str, payload: &[u8]) -> Result<Announcement, PayloadError> {
    let info: InfoPayload = serde_json::from_slice(payload)?;

    if let Some(claimed) = info.device_id.as_deref().filter(|s| !s.is_empty()) {
        if claimed != device_id {
            return Err(PayloadError::DeviceIdMismatch {
                topic: device_id.to_owned(),
                payload: claimed.to_owned(),
            });
        }
    }

    let host = info
        .host
        .or(info.ip)
        .map(|h| h.trim().to_owned())
        .filter(|h| !h.is_empty())
        .ok_or(PayloadError::MissingHost)?;
    let port = parse_port(info.port.as_ref().ok_or(PayloadError::MissingPort)?)?;

    let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
    Ok(Announcement {
        identity: DeviceIdentity::new(device_id, host, port),
        metadata: DeviceMetadata {
            name: non_empty(info.name).or_else(|| non_empty(info.hostname)),
            firmware_version: non_empty(info.firmware_version),
            capabilities: info.capabilities.unwrap_or_default(),
        },
    })
}

/// Firmware publishes the port as a number or a numeric string.
fn parse_port(value: &Value) -> Result<u16, PayloadError> {
    let port = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    };
    port.filter(|p| *p != 0)
        .ok_or_else(|| PayloadError::InvalidPort(value.to_string()))
}

// ── DiscoveryListener ────────────────────────────────────────────────

/// Turns a subscription into discovery events.
#[derive(Debug, Clone)]
pub struct DiscoveryListener {
    pattern: TopicPattern,
    removal: RemovalPolicy,
    reconnect: ReconnectConfig,
}

impl DiscoveryListener {
    pub fn new(pattern: TopicPattern, removal: RemovalPolicy) -> Self {
        Self {
            pattern,
            removal,
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    /// Interpret one message. `None` means "nothing to do": foreign topic,
    /// ignored tombstone, or malformed payload (logged).
    pub fn interpret(&self, msg: &InboundMessage) -> Option<DiscoveryEvent> {
        let Ok(device_id) = self.pattern.capture(&msg.topic) else {
            trace!(topic = %msg.topic, "topic outside discovery pattern");
            return None;
        };

        if msg.payload.trim_ascii().is_empty() {
            return match self.removal {
                RemovalPolicy::EmptyPayload => {
                    debug!(device_id, retained = msg.retained, "empty payload, device removed");
                    Some(DiscoveryEvent::Removed {
                        device_id: device_id.to_owned(),
                    })
                }
                RemovalPolicy::Ignore => {
                    debug!(device_id, "empty payload ignored");
                    None
                }
            };
        }

        match parse_announcement(device_id, &msg.payload) {
            Ok(announcement) => {
                trace!(
                    device_id,
                    address = %announcement.identity.address(),
                    retained = msg.retained,
                    "device announced"
                );
                Some(DiscoveryEvent::Announced(announcement))
            }
            Err(e) => {
                warn!(topic = %msg.topic, error = %e, "dropping malformed announcement");
                None
            }
        }
    }

    /// Subscribe and feed events to `sink` until `cancel` fires.
    ///
    /// When the stream ends or subscribing fails, waits with exponential
    /// backoff and subscribes again. A successful subscription resets the
    /// backoff.
    pub async fn run<S, F>(&self, source: &mut S, cancel: &CancellationToken, mut sink: F)
    where
        S: MessageSource,
        F: FnMut(DiscoveryEvent) + Send,
    {
        let mut attempt: u32 = 0;

        loop {
            let subscribed = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = source.subscribe(self.pattern.as_str()) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    info!(topic = %self.pattern, "subscribed to discovery topic");
                    attempt = 0;

                    loop {
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => return,
                            msg = stream.next() => match msg {
                                Some(msg) => {
                                    if let Some(event) = self.interpret(&msg) {
                                        sink(event);
                                    }
                                }
                                None => break,
                            },
                        }
                    }
                    warn!(topic = %self.pattern, "discovery stream ended, re-subscribing");
                }
                Err(e) => {
                    warn!(topic = %self.pattern, error = %e, attempt, "discovery subscription failed");
                }
            }

            if let Some(max) = self.reconnect.max_retries {
                if attempt >= max {
                    error!(max_retries = max, "discovery re-subscription limit reached, giving up");
                    break;
                }
            }

            let delay = self.reconnect.backoff(attempt);
            debug!(?delay, attempt, "waiting before re-subscribing");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
            attempt = attempt.saturating_add(1);
        }

        debug!("discovery loop exiting");
    }
}
