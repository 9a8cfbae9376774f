// ── Inbound operation surface ──
//
// Resolves an entry id to a device, delegates to the HTTP client and
// reports the outcome twice: as the return value, and through the
// optional notifier for a presentation layer. No business logic beyond
// resolution lives here.

use std::sync::Arc;

use akari_api::{Ack, ConfigSection, DeviceHealth, DeviceIdentity, DeviceSummary, SectionName};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::supervisor::Supervisor;

/// Names of the operations, as reported in [`Notification::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    GetConfigSection,
    UpdateConfigSection,
    GetDevices,
    RestartService,
    ReloadConfig,
    GetHealth,
}

/// Outbound message for the presentation layer.
#[derive(Debug, Clone)]
pub enum Notification {
    ConfigSection {
        entry_id: String,
        device_id: String,
        section: SectionName,
        data: ConfigSection,
    },
    ConfigUpdated {
        entry_id: String,
        device_id: String,
        section: SectionName,
        restart_required: bool,
    },
    Devices {
        entry_id: String,
        device_id: String,
        devices: Vec<DeviceSummary>,
    },
    ActionSent {
        entry_id: String,
        device_id: String,
        operation: Operation,
        message: Option<String>,
    },
    Failed {
        entry_id: String,
        operation: Operation,
        error: String,
    },
}

/// Callback receiving every [`Notification`].
pub type Notifier = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Outcome of a connectivity check on a device that is not yet managed.
#[derive(Debug)]
pub enum ProbeResult {
    Reachable(DeviceHealth),
    CannotConnect(String),
    InvalidAuth,
    Failed(akari_api::Error),
}

/// Request surface over a [`Supervisor`]. Cheaply cloneable.
#[derive(Clone)]
pub struct Operations {
    supervisor: Supervisor,
    notifier: Option<Notifier>,
}

impl Operations {
    pub(crate) fn new(supervisor: Supervisor, notifier: Option<Notifier>) -> Self {
        Self {
            supervisor,
            notifier,
        }
    }

    /// Resolve an entry id to a device identity.
    ///
    /// Order: a configured entry bound to a device id the registry knows (the
    /// discovered address wins over a configured host); a configured entry
    /// with an explicit host; a discovered device id used as-is.
    pub fn resolve(&self, entry_id: &str) -> Result<DeviceIdentity, CoreError> {
        let config = self.supervisor.config();
        let registry = self.supervisor.registry();
        let entry = config.entries.get(entry_id);

        let discovered = entry
            .and_then(|entry| entry.device_id.as_deref())
            .and_then(|device_id| registry.get(device_id));
        if let (Some(entry), Some(record)) = (entry, discovered) {
            let identity = record.identity.clone();
            return Ok(match entry.api_key.clone() {
                Some(key) => identity.with_api_key(Some(key)),
                None => identity,
            });
        }

        if let Some(identity) = config.entry_identity(entry_id) {
            return Ok(identity);
        }

        if let Some(entry) = entry {
            return Err(match entry.device_id.as_deref() {
                Some(device_id) => CoreError::DeviceNotDiscovered {
                    device_id: device_id.to_owned(),
                },
                None => CoreError::Config {
                    message: format!("entry '{entry_id}' has neither a host nor a device_id"),
                },
            });
        }

        registry
            .get(entry_id)
            .map(|record| record.identity.clone())
            .ok_or_else(|| CoreError::UnknownEntry {
                entry_id: entry_id.to_owned(),
            })
    }

    // ── Config sections ──────────────────────────────────────────────

    pub async fn get_config_section(
        &self,
        entry_id: &str,
        section: &str,
    ) -> Result<ConfigSection, CoreError> {
        let outcome = async {
            let section = SectionName::parse(section)?;
            let device = self.resolve(entry_id)?;
            let data = self.client().get_section(&device, section).await?;
            Ok::<_, CoreError>((device, section, data))
        }
        .await;

        match outcome {
            Ok((device, section, data)) => {
                self.notify(&Notification::ConfigSection {
                    entry_id: entry_id.to_owned(),
                    device_id: device.device_id,
                    section,
                    data: data.clone(),
                });
                Ok(data)
            }
            Err(e) => Err(self.failed(entry_id, Operation::GetConfigSection, e)),
        }
    }

    pub async fn update_config_section(
        &self,
        entry_id: &str,
        section: &str,
        data: &Map<String, Value>,
    ) -> Result<Ack, CoreError> {
        let outcome = async {
            let section = SectionName::parse(section)?;
            let device = self.resolve(entry_id)?;
            let ack = self.client().put_section(&device, section, data).await?;
            Ok::<_, CoreError>((device, section, ack))
        }
        .await;

        match outcome {
            Ok((device, section, ack)) => {
                self.notify(&Notification::ConfigUpdated {
                    entry_id: entry_id.to_owned(),
                    device_id: device.device_id,
                    section,
                    restart_required: ack.restart_required,
                });
                Ok(ack)
            }
            Err(e) => Err(self.failed(entry_id, Operation::UpdateConfigSection, e)),
        }
    }

    // ── Device list ──────────────────────────────────────────────────

    pub async fn get_devices(&self, entry_id: &str) -> Result<Vec<DeviceSummary>, CoreError> {
        let outcome = async {
            let device = self.resolve(entry_id)?;
            let devices = self.client().list_devices(&device).await?;
            Ok::<_, CoreError>((device, devices))
        }
        .await;

        match outcome {
            Ok((device, devices)) => {
                self.notify(&Notification::Devices {
                    entry_id: entry_id.to_owned(),
                    device_id: device.device_id,
                    devices: devices.clone(),
                });
                Ok(devices)
            }
            Err(e) => Err(self.failed(entry_id, Operation::GetDevices, e)),
        }
    }

    // ── Service control ──────────────────────────────────────────────

    pub async fn restart_service(&self, entry_id: &str) -> Result<Ack, CoreError> {
        let outcome = async {
            let device = self.resolve(entry_id)?;
            let ack = self.client().restart_service(&device).await?;
            Ok::<_, CoreError>((device, ack))
        }
        .await;
        self.action_sent(entry_id, Operation::RestartService, outcome)
    }

    /// Ask the device to reload its configuration, then refresh its
    /// health right away if it is being polled.
    pub async fn reload_config(&self, entry_id: &str) -> Result<Ack, CoreError> {
        let outcome = async {
            let device = self.resolve(entry_id)?;
            let ack = self.client().reload_config(&device).await?;
            Ok::<_, CoreError>((device, ack))
        }
        .await;

        if let Ok((device, _)) = &outcome {
            if self.supervisor.poke(&device.device_id) {
                debug!(device_id = %device.device_id, "health refresh requested after reload");
            }
        }
        self.action_sent(entry_id, Operation::ReloadConfig, outcome)
    }

    // ── Health ───────────────────────────────────────────────────────

    /// One-off health read, outside the poll cycle. The registry is not
    /// touched: the device's poller stays its only health writer.
    pub async fn get_health(&self, entry_id: &str) -> Result<DeviceHealth, CoreError> {
        let outcome = async {
            let device = self.resolve(entry_id)?;
            Ok::<_, CoreError>(self.client().get_health(&device).await?)
        }
        .await;
        outcome.map_err(|e| self.failed(entry_id, Operation::GetHealth, e))
    }

    /// Connectivity check for a device given by hand, before it is added.
    pub async fn probe(&self, identity: &DeviceIdentity) -> ProbeResult {
        match self.client().get_health(identity).await {
            Ok(health) => ProbeResult::Reachable(health),
            Err(e) if e.is_auth() => ProbeResult::InvalidAuth,
            Err(akari_api::Error::Unreachable { reason, .. }) => ProbeResult::CannotConnect(reason),
            Err(e) => ProbeResult::Failed(e),
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn client(&self) -> &akari_api::RemoteConfigClient {
        self.supervisor.client()
    }

    fn notify(&self, notification: &Notification) {
        if let Some(notifier) = &self.notifier {
            notifier(notification);
        }
    }

    fn action_sent(
        &self,
        entry_id: &str,
        operation: Operation,
        outcome: Result<(DeviceIdentity, Ack), CoreError>,
    ) -> Result<Ack, CoreError> {
        match outcome {
            Ok((device, ack)) => {
                self.notify(&Notification::ActionSent {
                    entry_id: entry_id.to_owned(),
                    device_id: device.device_id,
                    operation,
                    message: ack.message.clone(),
                });
                Ok(ack)
            }
            Err(e) => Err(self.failed(entry_id, operation, e)),
        }
    }

    fn failed(&self, entry_id: &str, operation: Operation, error: CoreError) -> CoreError {
        warn!(entry_id, %operation, error = %error, "operation failed");
        self.notify(&Notification::Failed {
            entry_id: entry_id.to_owned(),
            operation,
            error: error.to_string(),
        });
        error
    }
}
