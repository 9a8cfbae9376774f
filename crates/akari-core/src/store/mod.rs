// ── Device registry ──
//
// Lock-free device storage with synchronous change hooks and push-based
// snapshot notification.

mod registry;

pub use registry::{ChangeHook, ChangeKind, DeviceRegistry, RegistryChange, UpsertOutcome};
