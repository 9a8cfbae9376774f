// akari-api: Async Rust client for the Akari device control plane

pub mod client;
pub mod device;
pub mod error;
pub mod models;
pub mod transport;

mod health;
mod sections;
mod system;

pub use client::RemoteConfigClient;
pub use device::DeviceIdentity;
pub use error::Error;
pub use models::{
    Ack, ConfigSection, DeviceHealth, DeviceSummary, Module, ModuleState, ModuleStatus,
    SectionName,
};
pub use transport::{ApiKeyHeader, RetryPolicy, TransportConfig};
