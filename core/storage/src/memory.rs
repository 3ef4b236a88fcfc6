//! In-memory config store for testing.

use std::sync::{Arc, RwLock};

use imagehost_common::{ProviderId, Result};

use crate::store::{ConfigStore, CredentialRecord, StoreDocument};

/// In-memory config store.
///
/// Useful for testing and throwaway sessions. All data is lost on drop.
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    document: Arc<RwLock<StoreDocument>>,
}

impl MemoryConfigStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with one record.
    pub fn with_record(provider: ProviderId, record: CredentialRecord) -> Self {
        let store = Self::new();
        store.write(|doc| {
            doc.providers.insert(provider.as_str().to_string(), record);
        });
        store
    }

    /// Create a store holding `document` as-is.
    pub fn from_document(document: StoreDocument) -> Self {
        Self {
            document: Arc::new(RwLock::new(document)),
        }
    }

    /// Snapshot of the underlying document.
    pub fn snapshot(&self) -> StoreDocument {
        self.document
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn write(&self, f: impl FnOnce(&mut StoreDocument)) {
        let mut doc = self
            .document
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut doc);
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, provider: ProviderId) -> CredentialRecord {
        self.snapshot()
            .providers
            .get(provider.as_str())
            .cloned()
            .unwrap_or_default()
    }

    fn set(&self, provider: ProviderId, record: CredentialRecord) -> Result<()> {
        self.write(|doc| {
            doc.providers.insert(provider.as_str().to_string(), record);
        });
        Ok(())
    }

    fn clear(&self, provider: ProviderId) -> Result<()> {
        self.write(|doc| {
            doc.providers.remove(provider.as_str());
        });
        Ok(())
    }

    fn active_provider(&self) -> Option<String> {
        self.snapshot().active_provider
    }

    fn set_active_provider(&self, provider: ProviderId) -> Result<()> {
        self.write(|doc| doc.active_provider = Some(provider.as_str().to_string()));
        Ok(())
    }
}
