// Health endpoint

use crate::client::RemoteConfigClient;
use crate::device::DeviceIdentity;
use crate::error::Error;
use crate::models::DeviceHealth;

impl RemoteConfigClient {
    /// Fetch CPU temperature, RAM, uptime and module flags.
    ///
    /// `GET /health`
    pub async fn get_health(&self, device: &DeviceIdentity) -> Result<DeviceHealth, Error> {
        self.get_json(device, "health").await
    }
}
