/*
[INPUT]:  Storage file path and key/value writes
[OUTPUT]: JSON-file backed KeyValueStore with owner-only permissions
[POS]:    Storage layer - durable backend for tokens and the last-connector slot
[UPDATE]: When file format, location, or permissions change
*/

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::{ConnectError, Result};

use super::KeyValueStore;

const STORE_FILE_NAME: &str = "store.json";

/// Key/value store persisted as a single JSON object on disk
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by `dir/store.json`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STORE_FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    /// Store under the platform data directory.
    ///
    /// Default: `<data_dir>/walletgate/store.json`, falling back to
    /// `./.walletgate` when no data directory exists.
    pub fn in_default_location() -> Self {
        Self::new(default_store_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(storage_error)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, data: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(storage_error)?;
        }

        let encoded = serde_json::to_string_pretty(data)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, encoded).map_err(storage_error)?;
        restrict_permissions(&tmp_path)?;
        fs::rename(&tmp_path, &self.path).map_err(storage_error)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut data = self.load()?;
        f(&mut data);
        self.save(&data)
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.update(|data| {
            data.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.update(|data| {
            data.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.into_keys().collect())
    }
}

fn storage_error(err: std::io::Error) -> ConnectError {
    ConnectError::Storage(err.to_string())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path).map_err(storage_error)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms).map_err(storage_error)
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn default_store_dir() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join("walletgate"),
        None => std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".walletgate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("walletgate-test-{}", Uuid::new_v4()));
        path
    }

    #[test]
    fn test_file_store_lifecycle() {
        let dir = temp_dir();
        let store = FileStore::new(&dir);

        assert!(store.get_item("missing").unwrap().is_none());
        store.set_item("walletgate:connector", "metamask").unwrap();

        let reopened = FileStore::new(&dir);
        assert_eq!(
            reopened.get_item("walletgate:connector").unwrap(),
            Some("metamask".to_string())
        );
        assert_eq!(reopened.keys().unwrap(), vec!["walletgate:connector"]);

        reopened.remove_item("walletgate:connector").unwrap();
        assert!(store.get_item("walletgate:connector").unwrap().is_none());

        fs::remove_dir_all(dir).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = temp_dir();
        let store = FileStore::new(&dir);
        store.set_item("k", "v").unwrap();

        let metadata = fs::metadata(store.path()).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(STORE_FILE_NAME), "not json").unwrap();

        let store = FileStore::new(&dir);
        assert!(store.get_item("k").is_err());

        fs::remove_dir_all(dir).unwrap();
    }
}
