//! Provider registry: the fixed set of backends and the active selection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use imagehost_common::{format_file_size, Error, FileCategory, MediaFile, ProviderId, Result};

use crate::dropbox::DropboxProvider;
use crate::gdrive::GDriveProvider;
use crate::github::GitHubProvider;
use crate::http::HttpTransport;
use crate::onedrive::GraphProvider;
use crate::provider::{missing_required, ProgressEvent, ProgressFn, StorageProvider, UploadResult};
use crate::store::{ConfigStore, CredentialRecord};

/// Owns every provider and tracks which one receives uploads.
///
/// The selection is persisted through the config store and restored on
/// construction. All methods take `&self`, so one registry can be shared
/// across concurrent uploads.
pub struct ProviderRegistry {
    store: Arc<dyn ConfigStore>,
    github: Arc<GitHubProvider>,
    providers: [Arc<dyn StorageProvider>; 4],
    active: RwLock<ProviderId>,
}

impl ProviderRegistry {
    /// Create a registry over `store`, with every provider sending through
    /// `transport`.
    ///
    /// # Postconditions
    /// - The active provider is the persisted one, or GitHub if it is
    ///   missing or unknown
    pub fn new(store: Arc<dyn ConfigStore>, transport: Arc<dyn HttpTransport>) -> Self {
        let github = Arc::new(GitHubProvider::new(store.clone(), transport.clone()));
        let providers: [Arc<dyn StorageProvider>; 4] = [
            github.clone(),
            Arc::new(GDriveProvider::new(store.clone(), transport.clone())),
            Arc::new(GraphProvider::new(store.clone(), transport.clone())),
            Arc::new(DropboxProvider::new(store.clone(), transport)),
        ];

        let active = match store.active_provider() {
            Some(saved) => ProviderId::parse(&saved).unwrap_or_else(|| {
                warn!("Unknown saved provider '{}', using GitHub", saved);
                ProviderId::default()
            }),
            None => ProviderId::default(),
        };
        debug!("Active provider: {}", active);

        Self {
            store,
            github,
            providers,
            active: RwLock::new(active),
        }
    }

    /// Identifier of the active provider.
    pub fn active_id(&self) -> ProviderId {
        *self.active.read().unwrap_or_else(|e| e.into_inner())
    }

    /// The active provider.
    pub fn active(&self) -> Arc<dyn StorageProvider> {
        self.get(self.active_id())
    }

    /// Switch the active provider and persist the choice.
    ///
    /// Returns `Ok(false)` and changes nothing if `id` is unknown.
    ///
    /// # Errors
    /// - The selection could not be persisted
    pub fn set_active(&self, id: &str) -> Result<bool> {
        let Some(provider) = ProviderId::parse(id) else {
            debug!("Ignoring unknown provider '{}'", id);
            return Ok(false);
        };

        self.store.set_active_provider(provider)?;
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = provider;
        info!("Switched to {}", provider.display_name());
        Ok(true)
    }

    /// Provider by identifier.
    pub fn get(&self, id: ProviderId) -> Arc<dyn StorageProvider> {
        self.providers[Self::index(id)].clone()
    }

    /// The GitHub provider, for its connection test.
    pub fn github(&self) -> &GitHubProvider {
        &self.github
    }

    /// All providers in display order.
    pub fn providers(&self) -> &[Arc<dyn StorageProvider>] {
        &self.providers
    }

    fn index(id: ProviderId) -> usize {
        match id {
            ProviderId::GitHub => 0,
            ProviderId::GoogleDrive => 1,
            ProviderId::OneDrive => 2,
            ProviderId::Dropbox => 3,
        }
    }

    /// Upload a file to the active provider.
    ///
    /// # Preconditions
    /// - The active provider is connected
    ///
    /// # Postconditions
    /// - On success, `progress` has received a final 100% event
    ///
    /// # Errors
    /// - `NotConfigured` if the active provider lacks credentials; no
    ///   request is sent
    /// - `UnsupportedFile` for anything but images and videos
    /// - `FileTooLarge` above the active provider's limit
    /// - Any error of the provider's upload
    pub async fn dispatch_upload(
        &self,
        file: &MediaFile,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<UploadResult> {
        let provider = self.active();
        if !provider.is_connected() {
            return Err(Error::NotConfigured {
                provider: provider.display_name().to_string(),
            });
        }

        validate_file(provider.id(), file)?;

        debug!(
            "Uploading {} ({}) to {}",
            file.name,
            format_file_size(file.size()),
            provider.display_name()
        );
        let completed = AtomicBool::new(false);
        let forward = |event: ProgressEvent| {
            if event.percent >= 100 {
                completed.store(true, Ordering::Relaxed);
            }
            if let Some(sink) = progress {
                sink(event);
            }
        };
        let result = provider.upload(file, Some(&forward)).await?;

        // Providers that stop short of 100 still complete the bar.
        if let Some(sink) = progress {
            if !completed.load(Ordering::Relaxed) {
                sink(ProgressEvent {
                    percent: 100,
                    label: "Upload complete".to_string(),
                });
            }
        }
        info!(
            "Uploaded {} to {} as {}",
            file.name, result.provider_label, result.file_name
        );
        Ok(result)
    }

    /// Replace a provider's credentials.
    ///
    /// Optional fields left empty are filled with their defaults.
    ///
    /// # Errors
    /// - `Config` naming the missing required fields; nothing is stored
    pub fn save_credentials(&self, id: ProviderId, record: CredentialRecord) -> Result<()> {
        let provider = self.get(id);
        let fields = provider.fields();

        let missing = missing_required(fields, &record);
        if !missing.is_empty() {
            return Err(Error::Config {
                provider: provider.display_name().to_string(),
                message: format!("missing {}", missing.join(", ")),
            });
        }

        let mut record: CredentialRecord = record
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| (key, value.trim()))
            .collect();
        for field in fields {
            if let (false, Some(default)) = (record.has(field.key), field.default) {
                record.set(field.key, default);
            }
        }

        self.store.set(id, record)?;
        info!("Saved {} credentials", provider.display_name());
        Ok(())
    }

    /// Merge optional settings into a provider's existing record.
    ///
    /// An empty value resets a field to its default.
    ///
    /// # Errors
    /// - `InvalidInput` if `changes` names a required or unknown field
    pub fn update_settings(&self, id: ProviderId, changes: CredentialRecord) -> Result<()> {
        let provider = self.get(id);
        let fields = provider.fields();
        let mut record = provider.credentials();

        for (key, value) in changes.iter() {
            let field = fields
                .iter()
                .find(|f| f.key == key && !f.required)
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "'{}' is not a {} setting",
                        key,
                        provider.display_name()
                    ))
                })?;

            let value = value.trim();
            match (value.is_empty(), field.default) {
                (false, _) => record.set(key, value),
                (true, Some(default)) => record.set(key, default),
                (true, None) => {
                    record.remove(key);
                }
            }
        }

        self.store.set(id, record)?;
        info!("Saved {} settings", provider.display_name());
        Ok(())
    }

    /// Forget a provider's credentials.
    pub fn disconnect(&self, id: ProviderId) -> Result<()> {
        self.store.clear(id)?;
        info!("Disconnected {}", id.display_name());
        Ok(())
    }
}

/// Check the file against what `provider` can host.
fn validate_file(provider: ProviderId, file: &MediaFile) -> Result<()> {
    if file.category() == FileCategory::Unknown {
        return Err(Error::UnsupportedFile(format!(
            "{} ({}), only images and videos can be uploaded",
            file.name, file.mime_type
        )));
    }

    let limit = provider.max_file_size();
    if file.size() > limit {
        return Err(Error::FileTooLarge {
            provider: provider.display_name().to_string(),
            size: file.size(),
            limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConfigStore;
    use crate::store::StoreDocument;
    use crate::testing::{sample_png, StubTransport};
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn setup(store: MemoryConfigStore) -> (ProviderRegistry, Arc<StubTransport>, MemoryConfigStore) {
        let stub = StubTransport::new();
        let registry = ProviderRegistry::new(Arc::new(store.clone()), stub.clone());
        (registry, stub, store)
    }

    fn github_record() -> CredentialRecord {
        CredentialRecord::new()
            .with("token", "ghp_secret")
            .with("owner", "u")
            .with("repo", "r")
    }

    #[test]
    fn test_defaults_to_github() {
        let (registry, _, _) = setup(MemoryConfigStore::new());
        assert_eq!(registry.active_id(), ProviderId::GitHub);
        assert_eq!(registry.active().display_name(), "GitHub");
    }

    #[test]
    fn test_restores_saved_selection() {
        let store = MemoryConfigStore::new();
        store.set_active_provider(ProviderId::Dropbox).unwrap();

        let (registry, _, _) = setup(store);
        assert_eq!(registry.active_id(), ProviderId::Dropbox);
    }

    #[test]
    fn test_unknown_saved_selection_falls_back() {
        let store = MemoryConfigStore::from_document(StoreDocument {
            active_provider: Some("ftp".to_string()),
            ..Default::default()
        });

        let (registry, _, _) = setup(store);
        assert_eq!(registry.active_id(), ProviderId::GitHub);
    }

    #[test]
    fn test_set_active_persists() {
        let (registry, _, store) = setup(MemoryConfigStore::new());

        assert!(registry.set_active("onedrive").unwrap());
        assert_eq!(registry.active_id(), ProviderId::OneDrive);
        assert_eq!(store.active_provider().as_deref(), Some("onedrive"));

        assert!(!registry.set_active("ftp").unwrap());
        assert_eq!(registry.active_id(), ProviderId::OneDrive);
        assert_eq!(store.active_provider().as_deref(), Some("onedrive"));
    }

    #[test]
    fn test_providers_in_display_order() {
        let (registry, _, _) = setup(MemoryConfigStore::new());
        let ids: Vec<ProviderId> = registry.providers().iter().map(|p| p.id()).collect();
        assert_eq!(ids, ProviderId::ALL.to_vec());
        for id in ProviderId::ALL {
            assert_eq!(registry.get(id).id(), id);
        }
    }

    #[tokio::test]
    async fn test_dispatch_not_configured_sends_nothing() {
        for id in ProviderId::ALL {
            let (registry, stub, _) = setup(MemoryConfigStore::new());
            registry.set_active(id.as_str()).unwrap();

            let err = registry.dispatch_upload(&sample_png(), None).await.unwrap_err();
            match err {
                Error::NotConfigured { provider } => assert_eq!(provider, id.display_name()),
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(stub.calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_dispatch_rejects_unsupported_file() {
        let (registry, stub, _) =
            setup(MemoryConfigStore::with_record(ProviderId::GitHub, github_record()));
        let file = MediaFile::new("notes.txt", "text/plain", b"hello".to_vec());

        let err = registry.dispatch_upload(&file, None).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFile(_)));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_oversized_file() {
        let (registry, stub, _) =
            setup(MemoryConfigStore::with_record(ProviderId::GitHub, github_record()));
        let file = MediaFile::new(
            "big.png",
            "image/png",
            vec![0; (ProviderId::GitHub.max_file_size() + 1) as usize],
        );

        let err = registry.dispatch_upload(&file, None).await.unwrap_err();
        match err {
            Error::FileTooLarge { provider, limit, .. } => {
                assert_eq!(provider, "GitHub");
                assert_eq!(limit, 25 * 1024 * 1024);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_reports_completion() {
        let (registry, stub, _) =
            setup(MemoryConfigStore::with_record(ProviderId::GitHub, github_record()));
        stub.respond_json(200, json!({"full_name": "u/r", "default_branch": "main"}));
        stub.respond(201, "{}");

        let seen = Mutex::new(Vec::new());
        let sink: &ProgressFn = &|event: ProgressEvent| seen.lock().unwrap().push(event.percent);

        let result = registry.dispatch_upload(&sample_png(), Some(sink)).await.unwrap();
        assert_eq!(result.provider_label, "GitHub");

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.last(), Some(&100));
        assert_eq!(seen.iter().filter(|&&p| p == 100).count(), 1);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_dispatch_failure_skips_completion() {
        let (registry, stub, _) =
            setup(MemoryConfigStore::with_record(ProviderId::GitHub, github_record()));
        stub.respond(404, "{}");

        let seen = Mutex::new(Vec::new());
        let sink: &ProgressFn = &|event: ProgressEvent| seen.lock().unwrap().push(event.percent);

        assert!(registry.dispatch_upload(&sample_png(), Some(sink)).await.is_err());
        assert!(!seen.lock().unwrap().contains(&100));
    }

    #[tokio::test]
    async fn test_dispatch_follows_active_provider() {
        let store = MemoryConfigStore::with_record(ProviderId::GitHub, github_record());
        store
            .set(ProviderId::Dropbox, CredentialRecord::new().with("accessToken", "sl"))
            .unwrap();
        let (registry, stub, _) = setup(store);
        registry.set_active("dropbox").unwrap();
        stub.respond_json(200, json!({"path_display": "/ImageHosting/x.png"}));
        stub.respond_json(200, json!({"url": "https://www.dropbox.com/s/x?dl=0"}));

        let result = registry.dispatch_upload(&sample_png(), None).await.unwrap();
        assert_eq!(result.provider_label, "Dropbox");
        assert!(stub.request(0).url.starts_with("https://content.dropboxapi.com/"));
    }

    #[test]
    fn test_save_credentials_fills_defaults() {
        let (registry, _, store) = setup(MemoryConfigStore::new());

        registry
            .save_credentials(ProviderId::GitHub, github_record().with("path", " "))
            .unwrap();

        let saved = store.get(ProviderId::GitHub);
        assert_eq!(saved.get("path"), Some("images"));
        assert_eq!(saved.get("branch"), Some("main"));
        assert!(registry.get(ProviderId::GitHub).is_connected());
    }

    #[test]
    fn test_save_credentials_requires_fields() {
        let (registry, _, store) = setup(MemoryConfigStore::new());

        let err = registry
            .save_credentials(ProviderId::GitHub, CredentialRecord::new().with("token", "t"))
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(store.get(ProviderId::GitHub).is_empty());
    }

    #[test]
    fn test_save_credentials_drive_has_no_default_folder() {
        let (registry, _, store) = setup(MemoryConfigStore::new());
        registry
            .save_credentials(
                ProviderId::GoogleDrive,
                CredentialRecord::new().with("accessToken", "ya29"),
            )
            .unwrap();
        assert_eq!(store.get(ProviderId::GoogleDrive).get("folderId"), None);
    }

    #[test]
    fn test_update_settings_merges() {
        let (registry, _, store) = setup(MemoryConfigStore::new());
        registry.save_credentials(ProviderId::GitHub, github_record()).unwrap();

        registry
            .update_settings(
                ProviderId::GitHub,
                CredentialRecord::new().with("branch", "gh-pages").with("path", ""),
            )
            .unwrap();

        let saved = store.get(ProviderId::GitHub);
        assert_eq!(saved.get("token"), Some("ghp_secret"));
        assert_eq!(saved.get("branch"), Some("gh-pages"));
        assert_eq!(saved.get("path"), Some("images"));
    }

    #[test]
    fn test_update_settings_rejects_required_fields() {
        let (registry, _, _) = setup(MemoryConfigStore::new());
        let err = registry
            .update_settings(ProviderId::GitHub, CredentialRecord::new().with("token", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_disconnect_clears_record() {
        let (registry, _, store) = setup(MemoryConfigStore::new());
        registry.save_credentials(ProviderId::GitHub, github_record()).unwrap();

        registry.disconnect(ProviderId::GitHub).unwrap();
        assert!(store.get(ProviderId::GitHub).is_empty());
        assert!(!registry.get(ProviderId::GitHub).is_connected());
    }

    #[test]
    fn test_validate_file_accepts_video() {
        let file = MediaFile::new("clip.mp4", "video/mp4", vec![0; 16]);
        assert!(validate_file(ProviderId::Dropbox, &file).is_ok());
    }

    proptest! {
        #[test]
        fn prop_connected_iff_required_present(
            provider_index in 0usize..4,
            keep in proptest::collection::vec(any::<bool>(), 5),
        ) {
            let id = ProviderId::ALL[provider_index];
            let (registry, _, store) = setup(MemoryConfigStore::new());
            let provider = registry.get(id);
            let fields = provider.fields();

            let record: CredentialRecord = fields
                .iter()
                .zip(keep.iter())
                .filter(|(_, keep)| **keep)
                .map(|(field, _)| (field.key, "value"))
                .collect();
            let expected = fields
                .iter()
                .zip(keep.iter())
                .all(|(field, keep)| !field.required || *keep);

            store.set(id, record).unwrap();
            prop_assert_eq!(provider.is_connected(), expected);
            prop_assert_eq!(provider.config_form().connected, expected);
        }
    }
}
