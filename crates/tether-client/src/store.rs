//! Published state snapshots
//!
//! The store holds the single authoritative `AppState` snapshot behind a
//! watch channel. Reads are lock-free: `snapshot` clones the current `Arc`,
//! and observers await change notifications on their own receiver, decoupled
//! from the coordinator worker that commits.

use std::sync::Arc;

use tokio::sync::watch;

use tether_core::AppState;

/// Shared handle to the published application state
#[derive(Clone)]
pub struct StateStore {
    tx: watch::Sender<Arc<AppState>>,
}

impl StateStore {
    /// A store holding the default (disconnected) state
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(AppState::default()));
        Self { tx }
    }

    /// The current snapshot. Cheap; no lock is held afterwards.
    pub fn snapshot(&self) -> Arc<AppState> {
        self.tx.borrow().clone()
    }

    /// Subscribe to commit notifications
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.tx.subscribe()
    }

    /// Publish a new snapshot. The thread-ordering invariant is
    /// re-established here so no observer can see a stale sort.
    pub(crate) fn commit(&self, mut state: AppState) {
        state.sort_threads();
        self.tx.send_replace(Arc::new(state));
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
