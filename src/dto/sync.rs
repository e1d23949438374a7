use uuid::Uuid;

/// Identifies one context (one store instance) attached to an origin.
pub type ContextId = Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Storage mutation notification delivered to every context of an origin.
pub struct StorageEvent {
    /// Storage key that changed.
    pub key: String,
    /// Exact string written to durable storage; `None` when the key was removed.
    pub new_value: Option<String>,
    /// Context that performed the write.
    pub source: ContextId,
}

impl StorageEvent {
    pub fn new(key: impl Into<String>, new_value: Option<String>, source: ContextId) -> Self {
        Self {
            key: key.into(),
            new_value,
            source,
        }
    }
}
