pub mod file;
pub mod memory;

use crate::dao::storage::StorageResult;

pub use self::{file::FileStorage, memory::MemoryStorage};

/// Durable string store keyed by name, shared by every context of one origin.
///
/// Calls are synchronous: a scoreboard update persists before its observers
/// run, and observers run before the update returns.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove_item(&self, key: &str) -> StorageResult<()>;
}
