// ── Per-device health polling ──
//
// One task per device: wait one interval, fetch health, record the
// outcome, repeat. Tasks never share a device, so each device's health
// has exactly one writer.
//
// Stopping a device cancels its token under the task's gate. The loop
// takes the same gate to check the token and make the first poll of the
// call, so once `stop` has returned no new call is issued for that
// device, whichever runtime flavor drives it. A call already in flight
// runs to completion and its result is dropped.

use std::collections::HashMap;
use std::future::{Future, poll_fn};
use std::pin::pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Poll;
use std::time::Duration;

use akari_api::{DeviceHealth, DeviceIdentity, RemoteConfigClient};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::model::PollFailure;
use crate::store::DeviceRegistry;

/// Source of device health. Implemented by [`RemoteConfigClient`]; tests
/// substitute their own.
pub trait HealthProbe: Send + Sync + 'static {
    fn get_health(
        &self,
        device: &DeviceIdentity,
    ) -> impl Future<Output = Result<DeviceHealth, akari_api::Error>> + Send;
}

impl HealthProbe for RemoteConfigClient {
    fn get_health(
        &self,
        device: &DeviceIdentity,
    ) -> impl Future<Output = Result<DeviceHealth, akari_api::Error>> + Send {
        RemoteConfigClient::get_health(self, device)
    }
}

struct PollTask {
    cancel: CancellationToken,
    gate: Arc<Mutex<()>>,
    wake: Arc<Notify>,
    handle: JoinHandle<()>,
}

struct PollerInner<P> {
    probe: Arc<P>,
    registry: Arc<DeviceRegistry>,
    interval: Duration,
    cancel: CancellationToken,
    tasks: Mutex<HashMap<String, PollTask>>,
}

/// The set of running poll cycles. Cheaply cloneable.
pub struct Poller<P> {
    inner: Arc<PollerInner<P>>,
}

impl<P> Clone for Poller<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: HealthProbe> Poller<P> {
    /// Create a poller. Every cycle runs under a child of `cancel`.
    pub fn new(
        probe: Arc<P>,
        registry: Arc<DeviceRegistry>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                probe,
                registry,
                interval,
                cancel,
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Start polling a device. Returns `false` if it is already polled or
    /// the poller is shut down.
    pub fn start(&self, device_id: &str) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }

        let mut tasks = self.lock_tasks();
        if tasks.get(device_id).is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let cancel = self.inner.cancel.child_token();
        let wake = Arc::new(Notify::new());
        let gate = Arc::new(Mutex::new(()));
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.inner.probe),
            Arc::clone(&self.inner.registry),
            device_id.to_owned(),
            self.inner.interval,
            Arc::clone(&wake),
            Arc::clone(&gate),
            cancel.clone(),
        ));

        debug!(device_id, interval_secs = self.inner.interval.as_secs(), "poller started");
        tasks.insert(
            device_id.to_owned(),
            PollTask {
                cancel,
                gate,
                wake,
                handle,
            },
        );
        true
    }

    /// Stop polling a device. Returns `false` if it was not polled.
    ///
    /// When this returns, the device's cycle either already started its
    /// current call or will never start another one.
    pub fn stop(&self, device_id: &str) -> bool {
        let Some(task) = self.lock_tasks().remove(device_id) else {
            return false;
        };
        {
            let _gate = task.gate.lock().unwrap_or_else(PoisonError::into_inner);
            task.cancel.cancel();
        }
        debug!(device_id, "poller stopped");
        true
    }

    /// Poll a device now instead of at its next tick. The cycle then
    /// resumes its normal interval.
    pub fn poke(&self, device_id: &str) -> bool {
        match self.lock_tasks().get(device_id) {
            Some(task) => {
                task.wake.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn is_polling(&self, device_id: &str) -> bool {
        self.lock_tasks()
            .get(device_id)
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Cancel every cycle and wait for all of them to exit, in-flight
    /// calls included.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let tasks: Vec<PollTask> = self.lock_tasks().drain().map(|(_, t)| t).collect();
        for task in tasks {
            let _ = task.handle.await;
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, HashMap<String, PollTask>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn poll_loop<P: HealthProbe>(
    probe: Arc<P>,
    registry: Arc<DeviceRegistry>,
    device_id: String,
    interval: Duration,
    wake: Arc<Notify>,
    gate: Arc<Mutex<()>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            () = wake.notified() => ticker.reset(),
        }

        // Identity is re-read each cycle so a re-announced host/port is used.
        let Some(record) = registry.get(&device_id) else {
            debug!(%device_id, "device left the registry, poller exiting");
            break;
        };

        trace!(%device_id, address = %record.identity.address(), "polling health");
        let Some(result) =
            call_unless_cancelled(&gate, &cancel, probe.get_health(&record.identity)).await
        else {
            break;
        };

        if cancel.is_cancelled() {
            debug!(%device_id, "poller cancelled during call, result discarded");
            break;
        }
        if let Err(ref e) = result {
            debug!(%device_id, error = %e, "health poll failed");
        }
        registry.update_health(&device_id, result.map_err(|e| PollFailure::from(&e)));
    }
}

/// Drive `call` to completion unless `cancel` fires first. The check and
/// the call's first poll happen together under `gate`.
async fn call_unless_cancelled<F: Future>(
    gate: &Mutex<()>,
    cancel: &CancellationToken,
    call: F,
) -> Option<F::Output> {
    let mut call = pin!(call);
    let mut started = false;
    poll_fn(|cx| {
        if !started {
            let _gate = gate.lock().unwrap_or_else(PoisonError::into_inner);
            if cancel.is_cancelled() {
                return Poll::Ready(None);
            }
            started = true;
            return call.as_mut().poll(cx).map(Some);
        }
        call.as_mut().poll(cx).map(Some)
    })
    .await
}
