use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use uuid::Uuid;

use crate::dao::storage::{StorageError, StorageResult};

use super::KeyValueStore;

/// Directory-backed store: each key lives in `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a half-written snapshot.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) the storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| {
            StorageError::unavailable(format!("cannot create `{}`", dir.display()), err)
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::unavailable(
                format!("cannot read `{}`", path.display()),
                err,
            )),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        let staging = self
            .dir
            .join(format!(".{}.tmp", Uuid::new_v4().simple()));
        fs::write(&staging, value).map_err(|err| {
            StorageError::unavailable(format!("cannot write `{}`", staging.display()), err)
        })?;
        fs::rename(&staging, &path).map_err(|err| {
            let _ = fs::remove_file(&staging);
            StorageError::unavailable(format!("cannot replace `{}`", path.display()), err)
        })
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::unavailable(
                format!("cannot remove `{}`", path.display()),
                err,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_values_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("origin")).unwrap();

        assert_eq!(storage.get_item("scoreboardData").unwrap(), None);
        storage.set_item("scoreboardData", r#"{"quarter":2}"#).unwrap();
        storage.set_item("scoreboardData", r#"{"quarter":3}"#).unwrap();

        let reopened = FileStorage::open(storage.dir().to_path_buf()).unwrap();
        assert_eq!(
            reopened.get_item("scoreboardData").unwrap().as_deref(),
            Some(r#"{"quarter":3}"#)
        );

        let leftovers = fs::read_dir(storage.dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);

        storage.remove_item("scoreboardData").unwrap();
        storage.remove_item("scoreboardData").unwrap();
        assert_eq!(reopened.get_item("scoreboardData").unwrap(), None);
    }

    #[test]
    fn keys_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.set_item("../outside", "x").unwrap();
        assert!(dir.path().join("___outside.json").exists());
    }
}
