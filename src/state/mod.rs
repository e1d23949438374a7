pub mod observers;
pub mod scoreboard;
pub mod state_machine;

use std::{
    collections::VecDeque,
    sync::{
        Arc, Condvar, Mutex, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, ThreadId},
};

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clock::{Clock, Timestamp},
    dto::sync::{ContextId, StorageEvent},
    error::SyncError,
    services::sync_service::{STORAGE_KEY, SharedOrigin},
};

pub use self::observers::{ObserverRegistry, StateObserver, Subscription, SubscriptionId};
pub use self::scoreboard::{ClockSnapshot, GameDefaults, ScoreboardState, StatePatch, Team};

pub type SharedStore = Arc<ScoreboardStore>;

/// One context's copy of the scoreboard.
///
/// Each store is constructed explicitly against an origin; several stores on
/// the same origin behave like tabs sharing one browser storage area. All
/// mutation goes through [`update_state`](Self::update_state), which persists,
/// broadcasts to the other contexts and notifies this context's observers.
pub struct ScoreboardStore {
    id: ContextId,
    origin: SharedOrigin,
    clock: Arc<dyn Clock>,
    state: RwLock<ScoreboardState>,
    revision: AtomicU64,
    observers: ObserverRegistry,
    deliveries: Mutex<Deliveries>,
    delivered: Condvar,
    receiver: Mutex<Option<broadcast::Receiver<StorageEvent>>>,
}

/// Snapshots waiting for observers, in the order they were applied.
///
/// Only one thread delivers at a time. A nested update made by an observer
/// on the delivering thread is queued and delivered after the current one.
#[derive(Default)]
struct Deliveries {
    queue: VecDeque<(u64, ScoreboardState)>,
    courier: Option<ThreadId>,
    delivered: u64,
}

impl ScoreboardStore {
    /// Build defaults stamped at the current time, then shallow-merge whatever
    /// the origin has persisted over them.
    ///
    /// An unreadable or corrupt snapshot is logged and the defaults stand.
    /// The context joins the origin's broadcast before reading, so writes made
    /// by other contexts after this call are picked up once
    /// [`spawn_listener`](crate::services::sync_service::spawn_listener) runs.
    pub fn open(origin: SharedOrigin, clock: Arc<dyn Clock>, defaults: &GameDefaults) -> SharedStore {
        let id = Uuid::new_v4();
        let receiver = origin.subscribe();
        let mut state = ScoreboardState::with_defaults(defaults, clock.now_ms());

        match origin.read(STORAGE_KEY) {
            Ok(Some(saved)) => match scoreboard::parse_fields(&saved)
                .and_then(|fields| state.merged_with(fields))
            {
                Ok(merged) => {
                    info!(context = %id, quarter = merged.quarter, "restored persisted scoreboard");
                    state = merged;
                }
                Err(err) => {
                    warn!(context = %id, error = %err, "ignoring unreadable persisted scoreboard; using defaults");
                }
            },
            Ok(None) => debug!(context = %id, "no persisted scoreboard; using defaults"),
            Err(err) => {
                warn!(context = %id, error = %err, "failed to read persisted scoreboard; using defaults");
            }
        }

        Arc::new(Self {
            id,
            origin,
            clock,
            state: RwLock::new(state),
            revision: AtomicU64::new(0),
            observers: ObserverRegistry::new(),
            deliveries: Mutex::new(Deliveries::default()),
            delivered: Condvar::new(),
            receiver: Mutex::new(Some(receiver)),
        })
    }

    /// Hand out the broadcast receiver registered at [`open`](Self::open).
    ///
    /// Only the first call gets it.
    pub(crate) fn take_receiver(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn origin(&self) -> &SharedOrigin {
        &self.origin
    }

    /// Current time according to this context's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now_ms()
    }

    /// Owned copy of the current state.
    pub fn get_state(&self) -> ScoreboardState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of changes applied in this context, local or remote.
    ///
    /// Local to the context and never persisted; it orders this context's own
    /// view and does not detect writes lost between contexts.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Register an observer for every future change.
    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) -> Subscription {
        self.observers.subscribe(observer)
    }

    /// Stream of every future snapshot, alive as long as the subscription.
    pub fn subscribe_stream(&self) -> (Subscription, UnboundedReceiverStream<ScoreboardState>) {
        self.observers.subscribe_stream()
    }

    /// Apply a typed partial update.
    ///
    /// Identical values are still persisted and broadcast; callers that want
    /// to avoid redundant writes must skip the call themselves.
    pub fn update_state(&self, patch: StatePatch) {
        match patch.into_fields() {
            Ok(fields) => self.update_raw(fields),
            Err(err) => warn!(context = %self.id, error = %err, "dropping unencodable state patch"),
        }
    }

    /// Apply an untyped partial update (arbitrary keys are kept verbatim).
    ///
    /// Values that do not fit the scoreboard model reject the whole update.
    pub fn update_raw(&self, fields: Map<String, Value>) {
        let revision = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let merged = match guard.merged_with(fields) {
                Ok(merged) => merged,
                Err(err) => {
                    warn!(context = %self.id, error = %err, "rejected state update");
                    return;
                }
            };
            *guard = merged;

            if let Err(err) = self.persist(&guard) {
                warn!(context = %self.id, error = %err, "failed to persist scoreboard; keeping in-memory state");
            }
            self.enqueue(&guard)
        };

        self.deliver(revision);
    }

    /// React to a storage event from the origin.
    ///
    /// Returns `true` when the event changed this context's state. Events this
    /// context produced, other keys and removals are ignored; a malformed
    /// payload is logged and dropped without touching state.
    pub fn handle_storage_event(&self, event: &StorageEvent) -> bool {
        if event.source == self.id || event.key != STORAGE_KEY {
            return false;
        }
        let Some(payload) = event.new_value.as_deref() else {
            return false;
        };
        self.merge_remote(payload)
    }

    /// Re-read durable storage and merge it, as after missed events.
    pub fn rehydrate(&self) -> bool {
        match self.origin.read(STORAGE_KEY) {
            Ok(Some(saved)) => self.merge_remote(&saved),
            Ok(None) => false,
            Err(err) => {
                warn!(context = %self.id, error = %err, "failed to rehydrate scoreboard");
                false
            }
        }
    }

    fn merge_remote(&self, payload: &str) -> bool {
        let revision = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let merged = scoreboard::parse_fields(payload).and_then(|fields| guard.merged_with(fields));
            match merged {
                Ok(merged) => {
                    *guard = merged;
                    debug!(context = %self.id, quarter = guard.quarter, "merged scoreboard from another context");
                    self.enqueue(&guard)
                }
                Err(err) => {
                    warn!(context = %self.id, error = %err, "dropping malformed scoreboard broadcast");
                    return false;
                }
            }
        };

        self.deliver(revision);
        true
    }

    /// Bump the revision and queue the snapshot for observers.
    ///
    /// Must be called with the state write lock held so queue order matches
    /// apply order.
    fn enqueue(&self, state: &ScoreboardState) -> u64 {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .push_back((revision, state.clone()));
        revision
    }

    /// Return once observers have seen `revision`, delivering the queue
    /// ourselves when no other thread is.
    fn deliver(&self, revision: u64) {
        let me = thread::current().id();
        let mut deliveries = self.deliveries.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if deliveries.delivered >= revision {
                return;
            }
            let courier = deliveries.courier;
            match courier {
                // Nested update from an observer: the outer loop picks it up.
                Some(courier) if courier == me => return,
                Some(_) => {
                    deliveries = self
                        .delivered
                        .wait(deliveries)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                None => break,
            }
        }

        deliveries.courier = Some(me);
        loop {
            let Some((queued, snapshot)) = deliveries.queue.pop_front() else {
                break;
            };
            drop(deliveries);
            self.observers.notify(&snapshot);
            deliveries = self.deliveries.lock().unwrap_or_else(PoisonError::into_inner);
            deliveries.delivered = queued;
            self.delivered.notify_all();
        }
        deliveries.courier = None;
        self.delivered.notify_all();
    }

    fn persist(&self, state: &ScoreboardState) -> Result<(), SyncError> {
        let payload = state.to_json()?;
        self.origin.write(STORAGE_KEY, payload, self.id)?;
        Ok(())
    }
}
