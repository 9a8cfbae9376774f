// ── Supervisor facade ──
//
// Owns the shared HTTP client, the registry, the poll cycles and the
// discovery task. Cheaply cloneable; every clone drives the same fleet.

use std::sync::Arc;

use akari_api::{DeviceIdentity, RemoteConfigClient};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::SupervisorConfig;
use crate::discovery::{DiscoveryEvent, DiscoveryListener, MessageSource};
use crate::error::CoreError;
use crate::model::{Announcement, DeviceRecord};
use crate::operations::{Notifier, Operations};
use crate::poller::Poller;
use crate::store::{ChangeHook, DeviceRegistry, UpsertOutcome};
use crate::stream::DeviceStream;
use crate::topic::TopicPattern;

/// The main entry point for consumers.
///
/// [`new`](Self::new) spawns nothing: one-shot callers can use
/// [`operations`](Self::operations) straight away. [`start`](Self::start)
/// begins discovery and polling; [`shutdown`](Self::shutdown) stops both
/// and waits for in-flight calls to unwind.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    config: SupervisorConfig,
    client: Arc<RemoteConfigClient>,
    registry: Arc<DeviceRegistry>,
    poller: Poller<RemoteConfigClient>,
    listener: DiscoveryListener,
    cancel: CancellationToken,
    discovery: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    /// Build a supervisor and its HTTP client from configuration.
    pub fn new(config: SupervisorConfig) -> Result<Self, CoreError> {
        let client = RemoteConfigClient::new(config.transport.clone())?;
        Self::with_client(config, client)
    }

    /// Build a supervisor around an existing client.
    pub fn with_client(
        config: SupervisorConfig,
        client: RemoteConfigClient,
    ) -> Result<Self, CoreError> {
        let pattern = TopicPattern::parse(&config.discovery_topic)?;
        let listener = DiscoveryListener::new(pattern, config.removal_policy)
            .with_reconnect(config.reconnect.clone());

        let client = Arc::new(client);
        let registry = Arc::new(DeviceRegistry::new(config.failure_threshold));
        let cancel = CancellationToken::new();
        let poller = Poller::new(
            Arc::clone(&client),
            Arc::clone(&registry),
            config.poll_interval,
            cancel.child_token(),
        );

        Ok(Self {
            inner: Arc::new(SupervisorInner {
                config,
                client,
                registry,
                poller,
                listener,
                cancel,
                discovery: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &Arc<RemoteConfigClient> {
        &self.inner.client
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    pub fn subscribe(&self) -> DeviceStream {
        self.inner.registry.subscribe()
    }

    /// Register a synchronous registry change hook.
    pub fn on_change(&self, hook: ChangeHook) {
        self.inner.registry.on_change(hook);
    }

    /// Inbound operation surface bound to this supervisor.
    pub fn operations(&self, notifier: Option<Notifier>) -> Operations {
        Operations::new(self.clone(), notifier)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Register configured entries that carry a host, then spawn the
    /// discovery task on `source`.
    pub async fn start<S>(&self, mut source: S) -> Result<(), CoreError>
    where
        S: MessageSource + 'static,
    {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::ShuttingDown);
        }

        let mut discovery = self.inner.discovery.lock().await;
        if discovery.is_some() {
            return Err(CoreError::Subscription {
                reason: "discovery is already running".into(),
            });
        }

        for entry_id in self.inner.config.entries.keys() {
            if let Some(identity) = self.inner.config.entry_identity(entry_id) {
                debug!(%entry_id, device_id = %identity.device_id, "registering configured entry");
                self.add_device(identity);
            }
        }

        let supervisor = self.clone();
        let cancel = self.inner.cancel.child_token();
        *discovery = Some(tokio::spawn(async move {
            let listener = &supervisor.inner.listener;
            listener
                .run(&mut source, &cancel, |event| supervisor.apply(event))
                .await;
        }));

        info!(topic = %self.inner.listener.pattern(), "supervisor started");
        Ok(())
    }

    /// Cancel discovery and every poll cycle, then wait for them to exit.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.discovery.lock().await.take() {
            let _ = handle.await;
        }
        self.inner.poller.shutdown().await;

        info!(devices = self.inner.registry.len(), "supervisor stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    // ── Devices ──────────────────────────────────────────────────────

    /// Apply one discovery event. Newly seen devices start polling.
    pub fn apply(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Announced(Announcement { identity, metadata }) => {
                let api_key = self.inner.config.api_key_for(&identity.device_id);
                let identity = identity.with_api_key(api_key);
                let device_id = identity.device_id.clone();

                match self.inner.registry.upsert_announced(identity, metadata) {
                    UpsertOutcome::Created => {
                        info!(%device_id, "device discovered");
                        self.inner.poller.start(&device_id);
                    }
                    UpsertOutcome::Updated => debug!(%device_id, "device announcement updated"),
                    UpsertOutcome::Unchanged => trace!(%device_id, "device re-announced unchanged"),
                }
            }
            DiscoveryEvent::Removed { device_id } => {
                self.remove_device(&device_id);
            }
        }
    }

    /// Add a device by hand (manual entry). Starts polling if new.
    pub fn add_device(&self, identity: DeviceIdentity) -> UpsertOutcome {
        let device_id = identity.device_id.clone();
        let outcome = self.inner.registry.upsert_identity(identity);
        if outcome == UpsertOutcome::Created {
            self.inner.poller.start(&device_id);
        }
        outcome
    }

    /// Stop polling a device, then drop it from the registry.
    pub fn remove_device(&self, device_id: &str) -> Option<Arc<DeviceRecord>> {
        self.inner.poller.stop(device_id);
        self.inner.registry.remove(device_id)
    }

    /// Poll a device's health now.
    pub fn poke(&self, device_id: &str) -> bool {
        self.inner.poller.poke(device_id)
    }

    pub fn is_polling(&self, device_id: &str) -> bool {
        self.inner.poller.is_polling(device_id)
    }
}
