use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use url::Url;

use crate::error::Error;

/// Where a device lives on the network and how to authenticate with it.
///
/// The `device_id` is stable; `host`/`port` may be refreshed by a later
/// discovery announcement for the same id.
#[derive(Clone, Serialize)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    pub api_key: Option<SecretString>,
}

impl DeviceIdentity {
    pub fn new(device_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            device_id: device_id.into(),
            host: host.into(),
            port,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Control-plane root: `http://<host>:<port>/`.
    ///
    /// Bare IPv6 literals are bracketed.
    pub fn base_url(&self) -> Result<Url, Error> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        Ok(Url::parse(&format!("http://{host}:{}/", self.port))?)
    }

    /// `host:port`, for display.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for DeviceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.device_id == other.device_id
            && self.host == other.host
            && self.port == other.port
            && match (&self.api_key, &other.api_key) {
                (None, None) => true,
                (Some(a), Some(b)) => a.expose_secret() == b.expose_secret(),
                _ => false,
            }
    }
}

impl Eq for DeviceIdentity {}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_url_from_host_and_port() {
        let id = DeviceIdentity::new("rpi-zona-giorno", "192.168.1.40", 8080);
        assert_eq!(id.base_url().unwrap().as_str(), "http://192.168.1.40:8080/");
        assert_eq!(id.address(), "192.168.1.40:8080");
    }

    #[test]
    fn base_url_brackets_ipv6() {
        let id = DeviceIdentity::new("rpi", "fe80::1", 8080);
        assert_eq!(id.base_url().unwrap().as_str(), "http://[fe80::1]:8080/");
    }

    #[test]
    fn base_url_rejects_garbage_host() {
        let id = DeviceIdentity::new("rpi", "not a host", 8080);
        assert!(matches!(id.base_url(), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn equality_compares_api_keys() {
        let plain = DeviceIdentity::new("rpi", "10.0.0.2", 8080);
        let keyed = plain
            .clone()
            .with_api_key(Some(SecretString::from("k1".to_string())));
        let same_key = plain
            .clone()
            .with_api_key(Some(SecretString::from("k1".to_string())));

        assert_ne!(plain, keyed);
        assert_eq!(keyed, same_key);
        assert!(!format!("{keyed:?}").contains("k1"));
    }
}
