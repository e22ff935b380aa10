//! Durable key/value storage with the semantics of a browser's local storage:
//! string values, whole-value overwrite, last writer wins.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::domain::DashError;

pub trait Storage {
    fn get_item(&self, key: &str) -> Result<Option<String>, DashError>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), DashError>;
}

/// Stores every key as `<dir>/<key>.json`.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: &Path) -> Result<Self, DashError> {
        fs::create_dir_all(dir)?;
        debug!("Using view storage in {}", dir.display());
        Ok(FileStorage {
            dir: dir.to_path_buf(),
        })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, DashError> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), DashError> {
        // Readers never see a partially written file.
        let path = self.key_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        trace!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: HashMap<String, String>,
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, DashError> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), DashError> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(&dir.path().join("nested")).unwrap();

        assert_eq!(storage.get_item("savedViews").unwrap(), None);
        storage.set_item("savedViews", "{}").unwrap();
        storage.set_item("savedViews", "{\"a\":[]}").unwrap();
        assert_eq!(
            storage.get_item("savedViews").unwrap().as_deref(),
            Some("{\"a\":[]}")
        );
        assert!(dir.path().join("nested/savedViews.json").exists());
    }

    #[test]
    fn memory_storage_overwrites() {
        let mut storage = MemoryStorage::default();
        storage.set_item("k", "1").unwrap();
        storage.set_item("k", "2").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("2"));
    }
}
