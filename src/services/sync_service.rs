use std::sync::Arc;

use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    dao::{
        key_value::{KeyValueStore, MemoryStorage},
        storage::StorageResult,
    },
    dto::sync::{ContextId, StorageEvent},
    state::SharedStore,
};

/// Storage key every context reads and writes the scoreboard under.
pub const STORAGE_KEY: &str = "scoreboardData";
/// Default number of storage events buffered per listening context.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Handle to an origin, cloned into every context attached to it.
pub type SharedOrigin = Arc<StorageOrigin>;

/// Durable storage plus the broadcast channel that announces its mutations.
///
/// Contexts share nothing else: what one context writes reaches the others
/// only as a serialized [`StorageEvent`].
pub struct StorageOrigin {
    storage: Arc<dyn KeyValueStore>,
    sender: broadcast::Sender<StorageEvent>,
}

impl StorageOrigin {
    /// Build an origin over `storage`, buffering `capacity` events per listener.
    pub fn new(storage: Arc<dyn KeyValueStore>, capacity: usize) -> SharedOrigin {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Arc::new(Self { storage, sender })
    }

    /// Origin backed by process memory only.
    pub fn in_memory() -> SharedOrigin {
        Self::new(Arc::new(MemoryStorage::new()), DEFAULT_BROADCAST_CAPACITY)
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    /// Read the durable value stored under `key`.
    pub fn read(&self, key: &str) -> StorageResult<Option<String>> {
        self.storage.get_item(key)
    }

    /// Register a listener for subsequent storage events.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.sender.subscribe()
    }

    /// Persist `value`, then announce it to every listener.
    ///
    /// A failed write is not announced: other contexts keep the last value
    /// that actually reached storage.
    pub fn write(&self, key: &str, value: String, source: ContextId) -> StorageResult<()> {
        self.storage.set_item(key, &value)?;
        self.broadcast(StorageEvent::new(key, Some(value), source));
        Ok(())
    }

    /// Send an event to all current listeners, ignoring the no-listener case.
    pub fn broadcast(&self, event: StorageEvent) {
        let _ = self.sender.send(event);
    }
}

/// Keep `store` in step with writes made by the other contexts of its origin.
///
/// Events are read from the receiver the store registered when it opened, so
/// writes made between opening and listening are not lost. When the listener
/// falls behind, the skipped events are replaced by one re-read of durable
/// storage.
pub fn spawn_listener(store: SharedStore) -> JoinHandle<()> {
    let mut receiver = match store.take_receiver() {
        Some(receiver) => receiver,
        None => {
            let receiver = store.origin().subscribe();
            store.rehydrate();
            receiver
        }
    };

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    store.handle_storage_event(&event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        context = %store.id(),
                        skipped,
                        "storage listener lagged; rehydrating from durable storage"
                    );
                    store.rehydrate();
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!(context = %store.id(), "storage listener stopped");
    })
}
