// ── Runtime supervisor configuration ──
//
// Describes how to discover, poll and authenticate with devices. Carries
// credential data but never touches disk: akari-config (or any other
// caller) builds a `SupervisorConfig` and hands it in.

use std::collections::BTreeMap;
use std::time::Duration;

use akari_api::{DeviceIdentity, TransportConfig};
use secrecy::SecretString;

use crate::discovery::{ReconnectConfig, RemovalPolicy};

/// Default control-plane port of the device firmware.
pub const DEFAULT_DEVICE_PORT: u16 = 8080;

/// A configured alias that resolves to a device.
///
/// With `host` set the entry is addressed directly; otherwise `device_id`
/// is looked up among discovered devices.
#[derive(Debug, Clone)]
pub struct EntryConfig {
    pub device_id: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub api_key: Option<SecretString>,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            host: None,
            port: DEFAULT_DEVICE_PORT,
            api_key: None,
        }
    }
}

/// Configuration for a [`Supervisor`](crate::Supervisor).
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// HTTP timeout, retry policy and API key header style.
    pub transport: TransportConfig,
    /// Fixed delay between health polls of one device.
    pub poll_interval: Duration,
    /// Consecutive poll failures before a device is considered down.
    pub failure_threshold: u32,
    /// Discovery topic pattern, one `+` for the device id.
    pub discovery_topic: String,
    pub removal_policy: RemovalPolicy,
    /// Backoff used when the discovery subscription drops.
    pub reconnect: ReconnectConfig,
    /// Named entries, keyed by entry id.
    pub entries: BTreeMap<String, EntryConfig>,
    /// Key for devices without an entry-specific one.
    pub default_api_key: Option<SecretString>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            poll_interval: Duration::from_secs(30),
            failure_threshold: 3,
            discovery_topic: "home/+/info".into(),
            removal_policy: RemovalPolicy::default(),
            reconnect: ReconnectConfig::default(),
            entries: BTreeMap::new(),
            default_api_key: None,
        }
    }
}

impl SupervisorConfig {
    /// API key for a discovered device: the key of the first entry bound to
    /// that device id, else the default key.
    pub fn api_key_for(&self, device_id: &str) -> Option<SecretString> {
        self.entries
            .values()
            .filter(|e| e.device_id.as_deref() == Some(device_id))
            .find_map(|e| e.api_key.clone())
            .or_else(|| self.default_api_key.clone())
    }

    /// Identity of an entry addressed by explicit host. `None` for unknown
    /// entries and for entries that defer to discovery.
    pub fn entry_identity(&self, entry_id: &str) -> Option<DeviceIdentity> {
        let entry = self.entries.get(entry_id)?;
        let host = entry.host.as_deref()?;
        let device_id = entry.device_id.as_deref().unwrap_or(entry_id);
        let api_key = entry
            .api_key
            .clone()
            .or_else(|| self.default_api_key.clone());
        Some(DeviceIdentity::new(device_id, host, entry.port).with_api_key(api_key))
    }
}
