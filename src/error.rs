use thiserror::Error;

use crate::dao::storage::StorageError;

/// Failures while converting scoreboard state to or from its JSON form.
#[derive(Debug, Error)]
pub enum StateError {
    /// The in-memory state could not be turned into JSON.
    #[error("failed to serialize scoreboard state")]
    Serialize(#[source] serde_json::Error),
    /// A persisted or broadcast payload is not valid JSON.
    #[error("scoreboard payload is not valid JSON")]
    Parse(#[source] serde_json::Error),
    /// A payload parsed but is not a JSON object.
    #[error("scoreboard payload must be a JSON object")]
    NotAnObject,
    /// Merged fields do not fit the scoreboard model (wrong types, negatives).
    #[error("scoreboard payload does not fit the state model")]
    Malformed(#[source] serde_json::Error),
}

/// Failures while writing a snapshot through the shared origin.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The snapshot could not be encoded.
    #[error(transparent)]
    State(#[from] StateError),
    /// The durable write failed; nothing was broadcast.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read configuration file")]
    Read(#[source] std::io::Error),
    /// The file is not valid configuration JSON.
    #[error("failed to parse configuration file")]
    Parse(#[source] serde_json::Error),
    /// A value is out of range or malformed.
    #[error("invalid configuration: {0}")]
    Invalid(#[source] validator::ValidationErrors),
}
