// Service control and device listing endpoints

use reqwest::Method;
use tracing::info;

use crate::client::RemoteConfigClient;
use crate::device::DeviceIdentity;
use crate::error::Error;
use crate::models::{Ack, DeviceListBody, DeviceSummary};

impl RemoteConfigClient {
    /// Restart the device's main service.
    ///
    /// `POST /restart`
    pub async fn restart_service(&self, device: &DeviceIdentity) -> Result<Ack, Error> {
        let ack = self.send_ack(device, Method::POST, "restart", None).await?;
        info!(device_id = %device.device_id, "restart requested");
        Ok(ack)
    }

    /// Reload configuration from disk without a restart.
    ///
    /// `POST /reload`
    pub async fn reload_config(&self, device: &DeviceIdentity) -> Result<Ack, Error> {
        let ack = self.send_ack(device, Method::POST, "reload", None).await?;
        info!(device_id = %device.device_id, "config reload requested");
        Ok(ack)
    }

    /// List the devices (relays, covers, sensors...) configured on the unit.
    ///
    /// `GET /devices`
    pub async fn list_devices(&self, device: &DeviceIdentity) -> Result<Vec<DeviceSummary>, Error> {
        let body: DeviceListBody = self.get_json(device, "devices").await?;
        Ok(body.into_vec())
    }
}
