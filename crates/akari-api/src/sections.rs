// Config section endpoints
//
// Section names are validated by the `SectionName` type itself, so an
// unknown section can never produce a request.

use reqwest::Method;
use serde_json::{Map, Value};
use tracing::info;

use crate::client::RemoteConfigClient;
use crate::device::DeviceIdentity;
use crate::error::Error;
use crate::models::{Ack, ConfigSection, SectionName};

impl RemoteConfigClient {
    /// Read one configuration section.
    ///
    /// `GET /config/{section}`
    pub async fn get_section(
        &self,
        device: &DeviceIdentity,
        section: SectionName,
    ) -> Result<ConfigSection, Error> {
        self.get_object(device, &section_path(section))
            .await
            .map(ConfigSection::from)
    }

    /// Replace one configuration section. The device validates the content;
    /// `Ack::restart_required` tells whether a service restart is needed.
    ///
    /// `PUT /config/{section}`
    pub async fn put_section(
        &self,
        device: &DeviceIdentity,
        section: SectionName,
        data: &Map<String, Value>,
    ) -> Result<Ack, Error> {
        let ack = self
            .send_ack(device, Method::PUT, &section_path(section), Some(data))
            .await?;
        info!(
            device_id = %device.device_id,
            %section,
            restart_required = ack.restart_required,
            "config section updated"
        );
        Ok(ack)
    }
}

fn section_path(section: SectionName) -> String {
    format!("config/{section}")
}
