use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::index::SanctionIndex;
use crate::store::RecordStore;
use crate::target::{Notifier, SanctionEvent, SanctionTarget};

/// The record store and sanction index, guarded as one unit
///
/// An apply and a simultaneous expiry reversal for the same (subject, kind)
/// must not interleave, so every read-modify-persist sequence takes the
/// one lock over both.
pub struct CoreState {
    pub store: RecordStore,
    pub index: SanctionIndex,
}

/// Shared engine dependencies, built once at process start and passed by
/// handle into the sanction service and the reconciliation loop
pub struct Data {
    pub state: Mutex<CoreState>,
    pub target: Arc<dyn SanctionTarget>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Config,
}

impl Data {
    /// Load the store, rebuild the index from it, and bundle the
    /// collaborators
    ///
    /// The index exists before anything can observe the returned value, so
    /// the reconciliation loop can never scan a stale one.
    pub fn new(
        config: Config,
        target: Arc<dyn SanctionTarget>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let store = RecordStore::load(config.store.path.clone());
        let index = SanctionIndex::rebuild(&store);

        Self {
            state: Mutex::new(CoreState { store, index }),
            target,
            notifier,
            config,
        }
    }

    /// Publish an event, logging (not propagating) failures
    pub async fn notify(&self, event: SanctionEvent) {
        if let Err(e) = self.notifier.publish(&event).await {
            log::error!(
                "Error while publishing {} event for {}: {}",
                event.action,
                event.subject,
                e
            );
        }
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("state", &"Mutex<CoreState>")
            .field("target", &"Arc<dyn SanctionTarget>")
            .field("notifier", &"Arc<dyn Notifier>")
            .field("config", &self.config)
            .finish()
    }
}
