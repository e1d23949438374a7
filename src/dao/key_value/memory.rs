use dashmap::DashMap;

use crate::dao::storage::{StorageError, StorageResult};

use super::KeyValueStore;

/// In-process backend, optionally capped like a browser storage quota.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any single value larger than `limit` bytes.
    pub fn with_quota(limit: usize) -> Self {
        Self {
            items: DashMap::new(),
            quota: Some(limit),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl KeyValueStore for MemoryStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.items.get(key).map(|entry| entry.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        if let Some(limit) = self.quota {
            if value.len() > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    size: value.len(),
                    limit,
                });
            }
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.items.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_removes_values() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item("scoreboardData").unwrap(), None);
        storage.set_item("scoreboardData", "{}").unwrap();
        assert_eq!(storage.get_item("scoreboardData").unwrap().as_deref(), Some("{}"));
        storage.remove_item("scoreboardData").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn quota_rejects_oversized_values_and_keeps_previous() {
        let storage = MemoryStorage::with_quota(4);
        storage.set_item("k", "1234").unwrap();
        let err = storage.set_item("k", "12345").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { size: 5, limit: 4, .. }));
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("1234"));
    }
}
