use std::sync::{Arc, PoisonError, RwLock};

use akari_api::{DeviceHealth, DeviceIdentity};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::model::{DeviceMetadata, DeviceRecord, PollFailure};
use crate::stream::{DeviceStream, Snapshot};

/// Result of an identity upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First time this device id was seen.
    Created,
    /// Host, port, key or metadata changed.
    Updated,
    /// Identical to the stored record; nothing was published.
    Unchanged,
}

/// What a registry mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    IdentityUpdated,
    HealthUpdated,
    Removed,
}

/// Passed to change hooks after every effective mutation. For removals
/// `record` is the last state before removal.
#[derive(Debug, Clone)]
pub struct RegistryChange {
    pub kind: ChangeKind,
    pub record: Arc<DeviceRecord>,
}

/// Synchronous observer of registry mutations.
pub type ChangeHook = Arc<dyn Fn(&RegistryChange) + Send + Sync>;

/// Table of known devices keyed by device id.
///
/// Each mutation replaces one record in a single step with no suspension
/// point, then rebuilds the ordered snapshot and runs the change hooks.
/// Hooks run on the mutating task after all locks are released, so a hook
/// may read the registry (but should not block).
pub struct DeviceRegistry {
    records: DashMap<String, Arc<DeviceRecord>>,
    snapshot: watch::Sender<Snapshot>,
    hooks: RwLock<Vec<ChangeHook>>,
    failure_threshold: u32,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(3)
    }
}

impl DeviceRegistry {
    /// Create an empty registry. A threshold of 0 is treated as 1.
    pub fn new(failure_threshold: u32) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            records: DashMap::new(),
            snapshot,
            hooks: RwLock::new(Vec::new()),
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Register a change hook.
    pub fn on_change(&self, hook: ChangeHook) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Insert a device or refresh its host/port/key. Metadata of an
    /// existing record is kept.
    pub fn upsert_identity(&self, identity: DeviceIdentity) -> UpsertOutcome {
        self.upsert(identity, None)
    }

    /// Insert or refresh a device from a discovery announcement,
    /// replacing its metadata.
    pub fn upsert_announced(
        &self,
        identity: DeviceIdentity,
        metadata: DeviceMetadata,
    ) -> UpsertOutcome {
        self.upsert(identity, Some(metadata))
    }

    fn upsert(&self, identity: DeviceIdentity, metadata: Option<DeviceMetadata>) -> UpsertOutcome {
        let (outcome, record) = match self.records.entry(identity.device_id.clone()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                let metadata = metadata.unwrap_or_else(|| current.metadata.clone());
                if current.identity == identity && current.metadata == metadata {
                    return UpsertOutcome::Unchanged;
                }
                let record = Arc::new(DeviceRecord {
                    identity,
                    metadata,
                    ..DeviceRecord::clone(current)
                });
                slot.insert(Arc::clone(&record));
                (UpsertOutcome::Updated, record)
            }
            Entry::Vacant(slot) => {
                let record = Arc::new(DeviceRecord::new(identity, metadata.unwrap_or_default()));
                slot.insert(Arc::clone(&record));
                (UpsertOutcome::Created, record)
            }
        };

        let kind = match outcome {
            UpsertOutcome::Created => ChangeKind::Added,
            _ => ChangeKind::IdentityUpdated,
        };
        debug!(
            device_id = %record.identity.device_id,
            address = %record.identity.address(),
            ?kind,
            "registry upsert"
        );
        self.publish(kind, record);
        outcome
    }

    /// Apply one poll outcome. Unknown device ids are ignored (the device
    /// was removed while its poll was in flight).
    ///
    /// A failure keeps the last good health and bumps the failure counter;
    /// the device goes down when the counter reaches the threshold and
    /// comes back on the next success.
    pub fn update_health(&self, device_id: &str, result: Result<DeviceHealth, PollFailure>) {
        let threshold = self.failure_threshold;

        let (record, was_live) = {
            let Some(mut slot) = self.records.get_mut(device_id) else {
                debug!(device_id, "health update for unknown device ignored");
                return;
            };
            let current = slot.value();
            let was_live = current.live;
            let mut next = DeviceRecord::clone(current);

            match result {
                Ok(health) => {
                    next.health = Some(health);
                    next.last_success = Some(Utc::now());
                    next.consecutive_failures = 0;
                    next.last_error = None;
                    next.last_error_auth = false;
                    next.live = true;
                }
                Err(failure) => {
                    next.consecutive_failures = current.consecutive_failures.saturating_add(1);
                    next.last_error = Some(failure.reason);
                    next.last_error_auth = failure.auth;
                    next.live = next.consecutive_failures < threshold;
                }
            }

            let next = Arc::new(next);
            *slot.value_mut() = Arc::clone(&next);
            (next, was_live)
        };

        match (was_live, record.live) {
            (true, false) => warn!(
                device_id,
                failures = record.consecutive_failures,
                auth = record.last_error_auth,
                error = record.last_error.as_deref().unwrap_or_default(),
                "device is down"
            ),
            (false, true) => info!(device_id, "device is back up"),
            _ => {}
        }

        self.publish(ChangeKind::HealthUpdated, record);
    }

    /// Remove a device. Returns the removed record.
    pub fn remove(&self, device_id: &str) -> Option<Arc<DeviceRecord>> {
        let (_, record) = self.records.remove(device_id)?;
        info!(device_id, "device removed from registry");
        self.publish(ChangeKind::Removed, Arc::clone(&record));
        Some(record)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceRecord>> {
        self.records.get(device_id).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.records.contains_key(device_id)
    }

    /// All records ordered by device id (cheap `Arc` clone).
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> DeviceStream {
        DeviceStream::new(self.snapshot.subscribe())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Rebuild the snapshot and run hooks. Must be called with no map
    /// guard held.
    fn publish(&self, kind: ChangeKind, record: Arc<DeviceRecord>) {
        // Collect inside `send_modify` so concurrent publishers serialize
        // and the last one to run always sees the latest table.
        self.snapshot.send_modify(|snap| {
            let mut values: Vec<Arc<DeviceRecord>> =
                self.records.iter().map(|r| Arc::clone(r.value())).collect();
            values.sort_by(|a, b| a.identity.device_id.cmp(&b.identity.device_id));
            *snap = Arc::new(values);
        });

        let hooks = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let change = RegistryChange { kind, record };
        for hook in &hooks {
            hook(&change);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use akari_api::{DeviceHealth, ModuleStatus};
    use pretty_assertions::assert_eq;

    use super::*;

    fn identity(id: &str, host: &str) -> DeviceIdentity {
        DeviceIdentity::new(id, host, 8080)
    }

    fn health(uptime: u64) -> DeviceHealth {
        DeviceHealth {
            cpu_temp_c: 45.0,
            ram_used_bytes: 100,
            ram_total_bytes: 400,
            uptime_seconds: uptime,
            module_status: ModuleStatus::default(),
        }
    }

    fn failure() -> PollFailure {
        PollFailure {
            reason: "Device at http://10.0.0.2:8080/health is unreachable".into(),
            auth: false,
        }
    }

    fn recorder(registry: &DeviceRegistry) -> Arc<Mutex<Vec<ChangeKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.on_change(Arc::new(move |change: &RegistryChange| {
            sink.lock().unwrap().push(change.kind);
        }));
        seen
    }

    #[test]
    fn upsert_creates_then_updates() {
        let registry = DeviceRegistry::default();
        assert_eq!(
            registry.upsert_identity(identity("rpi-a", "10.0.0.2")),
            UpsertOutcome::Created
        );
        assert_eq!(
            registry.upsert_identity(identity("rpi-a", "10.0.0.3")),
            UpsertOutcome::Updated
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("rpi-a").unwrap().identity.host, "10.0.0.3");
    }

    #[test]
    fn identical_upsert_is_a_no_op() {
        let registry = DeviceRegistry::default();
        let seen = recorder(&registry);

        registry.upsert_identity(identity("rpi-a", "10.0.0.2"));
        let before = registry.snapshot();

        assert_eq!(
            registry.upsert_identity(identity("rpi-a", "10.0.0.2")),
            UpsertOutcome::Unchanged
        );
        assert!(Arc::ptr_eq(&before, &registry.snapshot()));
        assert_eq!(*seen.lock().unwrap(), vec![ChangeKind::Added]);
    }

    #[test]
    fn identity_upsert_keeps_announced_metadata() {
        let registry = DeviceRegistry::default();
        let metadata = DeviceMetadata {
            name: Some("Zona giorno".into()),
            firmware_version: Some("1.4.2".into()),
            capabilities: ["gpio".to_string()].into(),
        };
        registry.upsert_announced(identity("rpi-a", "10.0.0.2"), metadata.clone());

        assert_eq!(
            registry.upsert_identity(identity("rpi-a", "10.0.0.2")),
            UpsertOutcome::Unchanged
        );
        assert_eq!(registry.get("rpi-a").unwrap().metadata, metadata);
        assert_eq!(registry.get("rpi-a").unwrap().display_name(), "Zona giorno");
    }

    #[test]
    fn snapshot_is_ordered_by_device_id() {
        let registry = DeviceRegistry::default();
        for id in ["rpi-c", "rpi-a", "rpi-b"] {
            registry.upsert_identity(identity(id, "10.0.0.2"));
        }

        let ids: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|r| r.device_id().to_owned())
            .collect();
        assert_eq!(ids, vec!["rpi-a", "rpi-b", "rpi-c"]);
    }

    #[test]
    fn failures_below_threshold_keep_health_and_liveness() {
        let registry = DeviceRegistry::new(3);
        registry.upsert_identity(identity("rpi-a", "10.0.0.2"));
        registry.update_health("rpi-a", Ok(health(100)));

        for _ in 0..2 {
            registry.update_health("rpi-a", Err(failure()));
        }

        let record = registry.get("rpi-a").unwrap();
        assert!(record.live);
        assert_eq!(record.consecutive_failures, 2);
        assert_eq!(record.health, Some(health(100)));
        assert!(record.last_success.is_some());
        assert!(record.last_error.is_some());
    }

    #[test]
    fn liveness_flips_at_threshold_and_recovers() {
        let registry = DeviceRegistry::new(3);
        registry.upsert_identity(identity("rpi-a", "10.0.0.2"));
        registry.update_health("rpi-a", Ok(health(100)));

        for _ in 0..3 {
            registry.update_health("rpi-a", Err(failure()));
        }
        let record = registry.get("rpi-a").unwrap();
        assert!(!record.live);
        assert_eq!(record.health, Some(health(100)));

        registry.update_health("rpi-a", Ok(health(130)));
        let record = registry.get("rpi-a").unwrap();
        assert!(record.live);
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(record.last_error, None);
        assert_eq!(record.health, Some(health(130)));
    }

    #[test]
    fn refused_credentials_are_flagged_until_next_success() {
        let registry = DeviceRegistry::new(3);
        registry.upsert_identity(identity("rpi-a", "10.0.0.2"));

        registry.update_health(
            "rpi-a",
            Err(PollFailure::from(&akari_api::Error::Unauthorized { status: 401 })),
        );
        assert!(registry.get("rpi-a").unwrap().last_error_auth);

        registry.update_health("rpi-a", Err(failure()));
        assert!(!registry.get("rpi-a").unwrap().last_error_auth);

        registry.update_health(
            "rpi-a",
            Err(PollFailure::from(&akari_api::Error::Unauthorized { status: 403 })),
        );
        registry.update_health("rpi-a", Ok(health(100)));
        let record = registry.get("rpi-a").unwrap();
        assert!(!record.last_error_auth);
        assert_eq!(record.last_error, None);
    }

    #[test]
    fn health_for_unknown_device_is_ignored() {
        let registry = DeviceRegistry::default();
        let seen = recorder(&registry);

        registry.update_health("ghost", Ok(health(1)));
        assert!(registry.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn remove_notifies_with_last_state() {
        let registry = DeviceRegistry::default();
        let last_host = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last_host);
        registry.on_change(Arc::new(move |change: &RegistryChange| {
            if change.kind == ChangeKind::Removed {
                *sink.lock().unwrap() = Some(change.record.identity.host.clone());
            }
        }));

        registry.upsert_identity(identity("rpi-a", "10.0.0.9"));
        assert!(registry.remove("rpi-a").is_some());
        assert!(registry.remove("rpi-a").is_none());

        assert!(registry.snapshot().is_empty());
        assert_eq!(last_host.lock().unwrap().as_deref(), Some("10.0.0.9"));
    }

    #[test]
    fn hooks_may_read_the_registry() {
        let registry = Arc::new(DeviceRegistry::default());
        let observed = Arc::new(Mutex::new(Vec::new()));
        let reader = Arc::clone(&registry);
        let sink = Arc::clone(&observed);
        registry.on_change(Arc::new(move |change: &RegistryChange| {
            sink.lock().unwrap().push(reader.len());
            assert!(reader.get(change.record.device_id()).is_some() || change.kind == ChangeKind::Removed);
        }));

        registry.upsert_identity(identity("rpi-a", "10.0.0.2"));
        registry.upsert_identity(identity("rpi-b", "10.0.0.3"));
        assert_eq!(*observed.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn subscribers_see_each_mutation() {
        let registry = DeviceRegistry::default();
        let mut stream = registry.subscribe();
        assert!(stream.current().is_empty());

        registry.upsert_identity(identity("rpi-a", "10.0.0.2"));
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(stream.latest().len(), 1);
    }
}
