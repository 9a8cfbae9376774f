//! Supervisor layer between `akari-api` and its consumers (CLI, host glue).
//!
//! - **[`TopicPattern`]**: single-wildcard discovery topic matching.
//! - **[`DiscoveryListener`]**: turns a retained-message subscription into
//!   [`DiscoveryEvent`]s, re-subscribing when the transport drops.
//! - **[`DeviceRegistry`]**: lock-free table of [`DeviceRecord`]s with
//!   synchronous change hooks and watch-backed snapshot subscriptions.
//! - **[`Poller`]**: one health polling task per device.
//! - **[`Supervisor`]**: facade wiring the above to one shared
//!   [`RemoteConfigClient`](akari_api::RemoteConfigClient).
//! - **[`Operations`]**: the inbound request surface (read/write config
//!   sections, list devices, restart, reload) with an outbound
//!   notification callback.

pub mod config;
pub mod discovery;
pub mod error;
pub mod model;
pub mod operations;
pub mod poller;
pub mod store;
pub mod stream;
pub mod supervisor;
pub mod topic;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{EntryConfig, SupervisorConfig};
pub use discovery::{
    DiscoveryEvent, DiscoveryListener, InboundMessage, MessageSource, ReconnectConfig,
    RemovalPolicy,
};
pub use error::CoreError;
pub use model::{Announcement, DeviceMetadata, DeviceRecord, PollFailure};
pub use operations::{Notification, Notifier, Operation, Operations, ProbeResult};
pub use poller::{HealthProbe, Poller};
pub use store::{ChangeKind, DeviceRegistry, RegistryChange, UpsertOutcome};
pub use stream::DeviceStream;
pub use supervisor::Supervisor;
pub use topic::{NoMatch, TopicPattern};
