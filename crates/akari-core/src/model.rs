// ── Device domain types ──
//
// What the supervisor knows about one device: where it is (identity),
// what it said about itself (announcement metadata), and how its last
// polls went (health, counters, liveness).

use std::collections::BTreeSet;

use akari_api::{DeviceHealth, DeviceIdentity};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Descriptive fields from a discovery announcement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceMetadata {
    pub name: Option<String>,
    pub firmware_version: Option<String>,
    pub capabilities: BTreeSet<String>,
}

/// A validated discovery announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub identity: DeviceIdentity,
    pub metadata: DeviceMetadata,
}

/// Why a health poll failed, as stored on the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    pub reason: String,
    /// The device refused our credentials.
    pub auth: bool,
}

impl From<&akari_api::Error> for PollFailure {
    fn from(err: &akari_api::Error) -> Self {
        Self {
            reason: err.to_string(),
            auth: err.is_auth(),
        }
    }
}

/// Registry entry for one device.
///
/// Records are immutable values behind an `Arc`; every mutation swaps in a
/// complete new record, so readers never observe a half-applied update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub identity: DeviceIdentity,
    pub metadata: DeviceMetadata,
    /// Last good health; kept as-is across failed polls.
    pub health: Option<DeviceHealth>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    /// The last failure was the device refusing our credentials.
    pub last_error_auth: bool,
    /// `false` once `consecutive_failures` reaches the registry threshold.
    pub live: bool,
}

impl DeviceRecord {
    pub(crate) fn new(identity: DeviceIdentity, metadata: DeviceMetadata) -> Self {
        Self {
            identity,
            metadata,
            health: None,
            last_success: None,
            consecutive_failures: 0,
            last_error: None,
            last_error_auth: false,
            live: true,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.identity.device_id
    }

    /// Announced name, falling back to the device id.
    pub fn display_name(&self) -> &str {
        self.metadata
            .name
            .as_deref()
            .unwrap_or(&self.identity.device_id)
    }
}
