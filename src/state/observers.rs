use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, PoisonError, Weak},
};

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;
use uuid::Uuid;

use crate::state::scoreboard::ScoreboardState;

/// Identifier handed out for each distinct registered observer.
pub type SubscriptionId = Uuid;

/// Receives the full scoreboard after every applied change.
pub trait StateObserver: Send + Sync {
    fn on_state(&self, state: &ScoreboardState);
}

impl<F> StateObserver for F
where
    F: Fn(&ScoreboardState) + Send + Sync,
{
    fn on_state(&self, state: &ScoreboardState) {
        self(state)
    }
}

struct Registration {
    observer: Arc<dyn StateObserver>,
    handles: usize,
}

type Registrations = Mutex<IndexMap<SubscriptionId, Registration>>;

/// Ordered set of observers for one context.
///
/// Observers are keyed by `Arc` identity: registering the same observer again
/// hands out another handle to the existing registration instead of a second
/// delivery slot.
#[derive(Default)]
pub struct ObserverRegistry {
    inner: Arc<Registrations>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer`; the returned handle unsubscribes when dropped.
    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) -> Subscription {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let existing = guard
            .iter_mut()
            .find(|(_, registration)| Arc::ptr_eq(&registration.observer, &observer));

        let id = match existing {
            Some((id, registration)) => {
                registration.handles += 1;
                *id
            }
            None => {
                let id = Uuid::new_v4();
                guard.insert(
                    id,
                    Registration {
                        observer,
                        handles: 1,
                    },
                );
                id
            }
        };

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Forward every future snapshot into a stream.
    pub fn subscribe_stream(&self) -> (Subscription, UnboundedReceiverStream<ScoreboardState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(Arc::new(move |state: &ScoreboardState| {
            let _ = tx.send(state.clone());
        }));
        (subscription, UnboundedReceiverStream::new(rx))
    }

    /// Number of distinct registered observers.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `state` to every observer in registration order.
    ///
    /// The registry lock is released before any observer runs, so observers
    /// may subscribe, unsubscribe or trigger further updates. A panicking
    /// observer is logged and skipped.
    pub fn notify(&self, state: &ScoreboardState) {
        let observers: Vec<(SubscriptionId, Arc<dyn StateObserver>)> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, registration)| (*id, registration.observer.clone()))
            .collect();

        for (id, observer) in observers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.on_state(state)));
            if outcome.is_err() {
                warn!(subscription = %id, "state observer panicked; continuing with the rest");
            }
        }
    }
}

/// Disposer for one observer registration handle.
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<Registrations>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop receiving updates through this handle.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut guard = registry.lock().unwrap_or_else(PoisonError::into_inner);
        let remove = match guard.get_mut(&self.id) {
            Some(registration) => {
                registration.handles = registration.handles.saturating_sub(1);
                registration.handles == 0
            }
            None => false,
        };
        if remove {
            guard.shift_remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
