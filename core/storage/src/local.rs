//! JSON file config store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use imagehost_common::{Error, ProviderId, Result};

use crate::store::{ConfigStore, CredentialRecord, StoreDocument};

/// Config store persisted as a single JSON document on disk.
///
/// Each write re-reads the file, applies the change and writes it back.
/// Writers inside one process are serialized; across processes the last
/// write wins.
pub struct FileConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConfigStore {
    /// Create a store backed by `path`.
    ///
    /// The file and its parent directories are created on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document. A missing or empty file is an empty document.
    pub fn load(&self) -> Result<StoreDocument> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreDocument::default()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(StoreDocument::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            Error::Serialization(format!("Corrupt config file {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, doc: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        debug!("Saved config to {}", self.path.display());
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut StoreDocument)) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut doc = self.load()?;
        f(&mut doc);
        self.save(&doc)
    }

    fn load_or_empty(&self) -> StoreDocument {
        self.load().unwrap_or_else(|e| {
            warn!("Ignoring unreadable config: {}", e);
            StoreDocument::default()
        })
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, provider: ProviderId) -> CredentialRecord {
        self.load_or_empty()
            .providers
            .remove(provider.as_str())
            .unwrap_or_default()
    }

    fn set(&self, provider: ProviderId, record: CredentialRecord) -> Result<()> {
        self.update(|doc| {
            doc.providers.insert(provider.as_str().to_string(), record);
        })
    }

    fn clear(&self, provider: ProviderId) -> Result<()> {
        self.update(|doc| {
            doc.providers.remove(provider.as_str());
        })
    }

    fn active_provider(&self) -> Option<String> {
        self.load_or_empty().active_provider
    }

    fn set_active_provider(&self, provider: ProviderId) -> Result<()> {
        self.update(|doc| doc.active_provider = Some(provider.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileConfigStore) {
        let temp = TempDir::new().unwrap();
        let store = FileConfigStore::new(temp.path().join("nested").join("config.json"));
        (temp, store)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_temp, store) = setup();
        assert!(store.get(ProviderId::GitHub).is_empty());
        assert_eq!(store.active_provider(), None);
    }

    #[test]
    fn test_set_persists_across_instances() {
        let (_temp, store) = setup();
        store
            .set(
                ProviderId::GitHub,
                CredentialRecord::new().with("token", "t").with("owner", "u"),
            )
            .unwrap();
        store.set_active_provider(ProviderId::Dropbox).unwrap();

        let reopened = FileConfigStore::new(store.path());
        assert_eq!(reopened.get(ProviderId::GitHub).get("owner"), Some("u"));
        assert_eq!(reopened.active_provider().as_deref(), Some("dropbox"));
    }

    #[test]
    fn test_clear_removes_entry() {
        let (_temp, store) = setup();
        store
            .set(ProviderId::OneDrive, CredentialRecord::new().with("accessToken", "x"))
            .unwrap();
        store.clear(ProviderId::OneDrive).unwrap();
        assert!(store.get(ProviderId::OneDrive).is_empty());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("onedrive"));
    }

    #[test]
    fn test_reads_document_written_by_other_tools() {
        let (_temp, store) = setup();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{
                "image-hosting-storage-config": {
                    "dropbox": {"accessToken": "sl.abc", "path": "/Pics"}
                },
                "current-storage-provider": "dropbox"
            }"#,
        )
        .unwrap();

        assert_eq!(store.get(ProviderId::Dropbox).get("path"), Some("/Pics"));
        assert_eq!(store.active_provider().as_deref(), Some("dropbox"));
    }

    #[test]
    fn test_corrupt_file_reads_empty_but_write_fails() {
        let (_temp, store) = setup();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(store.get(ProviderId::GitHub).is_empty());
        assert!(matches!(store.load(), Err(Error::Serialization(_))));
        assert!(store
            .set(ProviderId::GitHub, CredentialRecord::new())
            .is_err());
    }
}
