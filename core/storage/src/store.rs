//! Credential persistence.
//!
//! Every provider keeps an opaque string map of settings under its id.
//! The whole store is one serialized document holding those maps plus the
//! registry's active provider selection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use imagehost_common::{ProviderId, Result};

/// Namespace key holding the per-provider credential records.
pub const CREDENTIALS_NAMESPACE: &str = "image-hosting-storage-config";

/// Key holding the active provider id.
pub const ACTIVE_PROVIDER_KEY: &str = "current-storage-provider";

/// Per-provider settings, keyed by field name.
///
/// Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialRecord(BTreeMap<String, String>);

impl CredentialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-empty value of a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Value of a field, or `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Whether a field has a non-empty value.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CredentialRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// The serialized form of a whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(rename = "image-hosting-storage-config", default)]
    pub providers: BTreeMap<String, CredentialRecord>,
    #[serde(
        rename = "current-storage-provider",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub active_provider: Option<String>,
}

/// Namespaced key-value persistence for provider credentials.
///
/// Writes replace a record wholesale. Implementations must be safe to share
/// between concurrently running uploads, which only ever read.
pub trait ConfigStore: Send + Sync {
    /// Record for a provider, empty if none was saved.
    fn get(&self, provider: ProviderId) -> CredentialRecord;

    /// Replace a provider's record.
    fn set(&self, provider: ProviderId, record: CredentialRecord) -> Result<()>;

    /// Remove a provider's record.
    fn clear(&self, provider: ProviderId) -> Result<()>;

    /// Persisted active provider id, unvalidated.
    fn active_provider(&self) -> Option<String>;

    /// Persist the active provider id.
    fn set_active_provider(&self, provider: ProviderId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_absent() {
        let record = CredentialRecord::new()
            .with("token", "")
            .with("owner", "   ")
            .with("repo", "r");

        assert!(!record.has("token"));
        assert!(!record.has("owner"));
        assert!(record.has("repo"));
        assert_eq!(record.get_or("token", "fallback"), "fallback");
    }

    #[test]
    fn test_document_uses_namespaced_keys() {
        let mut doc = StoreDocument::default();
        doc.providers.insert(
            "github".to_string(),
            CredentialRecord::new().with("token", "t"),
        );
        doc.active_provider = Some("dropbox".to_string());

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json[CREDENTIALS_NAMESPACE]["github"]["token"], "t");
        assert_eq!(json[ACTIVE_PROVIDER_KEY], "dropbox");
    }

    #[test]
    fn test_document_tolerates_missing_keys() {
        let doc: StoreDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.providers.is_empty());
        assert!(doc.active_provider.is_none());
    }
}
