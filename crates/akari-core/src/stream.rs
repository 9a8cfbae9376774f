// ── Registry snapshot streams ──
//
// Subscription handle for consumers that render the whole fleet (the CLI
// `watch` command, host glue pushing entity state).

use std::sync::Arc;

use tokio::sync::watch;

use crate::model::DeviceRecord;

/// Ordered, immutable view of every device at one point in time.
pub type Snapshot = Arc<Vec<Arc<DeviceRecord>>>;

/// A subscription to the device registry.
///
/// Gives point-in-time access plus change notification through
/// [`changed`](Self::changed).
pub struct DeviceStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl DeviceStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot as of creation or the last [`changed`](Self::changed).
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Latest snapshot, which may be newer than [`current`](Self::current).
    pub fn latest(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next registry mutation and return the new snapshot.
    /// Returns `None` once the registry has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }
}
