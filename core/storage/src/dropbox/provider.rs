//! Dropbox storage provider implementation.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use imagehost_common::{Error, MediaFile, ProviderId, Result};

use crate::http::HttpTransport;
use crate::links;
use crate::naming::{join_path, unique_file_name};
use crate::provider::{
    missing_required, FieldSpec, ProgressFn, ProgressReporter, StorageProvider, UploadResult,
};
use crate::store::{ConfigStore, CredentialRecord};

use super::client::{direct_content_url, DropboxClient};

const TOKEN_PAGE: &str = "https://www.dropbox.com/developers/apps";

const DEFAULT_PATH: &str = "/ImageHosting";

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("accessToken", "Access token", true),
    FieldSpec::optional("path", "Folder", Some(DEFAULT_PATH)),
];

/// Dropbox settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropboxConfig {
    pub access_token: String,
    pub path: String,
}

impl DropboxConfig {
    pub fn from_record(record: &CredentialRecord) -> Option<Self> {
        Some(Self {
            access_token: record.get("accessToken")?.to_string(),
            path: record.get_or("path", DEFAULT_PATH).to_string(),
        })
    }

    /// Absolute Dropbox path for a file in the configured folder.
    fn file_path(&self, file_name: &str) -> String {
        format!("/{}", join_path(&self.path, file_name))
    }
}

/// Stores files in a Dropbox app folder or full Dropbox.
pub struct DropboxProvider {
    store: Arc<dyn ConfigStore>,
    client: DropboxClient,
}

impl DropboxProvider {
    pub fn new(store: Arc<dyn ConfigStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            store,
            client: DropboxClient::new(transport),
        }
    }

    fn config(&self) -> Result<DropboxConfig> {
        let record = self.credentials();
        DropboxConfig::from_record(&record).ok_or_else(|| Error::Config {
            provider: self.display_name().to_string(),
            message: format!("missing {}", missing_required(FIELDS, &record).join(", ")),
        })
    }

    /// Shared link for a file: a fresh one, else an existing one.
    ///
    /// Returns `None` when neither call yields a link.
    async fn resolve_shared_link(&self, token: &str, path: &str) -> Option<String> {
        match self.client.create_shared_link(token, path).await {
            Ok(url) => return Some(url),
            Err(e) => log_link_failure(path, "create", &e),
        }

        match self.client.first_shared_link(token, path).await {
            Ok(Some(url)) => Some(url),
            Ok(None) => {
                warn!("No shared link exists for {}", path);
                None
            }
            Err(e) => {
                log_link_failure(path, "list", &e);
                None
            }
        }
    }
}

/// Creating a link for an already shared file fails with a conflict, which
/// the listing fallback handles.
fn log_link_failure(path: &str, action: &str, err: &Error) {
    if matches!(err, Error::Upload { message, .. } if message.starts_with("shared_link_already_exists")) {
        debug!("Shared link for {} already exists", path);
    } else {
        warn!("Could not {} shared link for {}: {}", action, path, err);
    }
}

#[async_trait]
impl StorageProvider for DropboxProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Dropbox
    }

    fn fields(&self) -> &'static [FieldSpec] {
        FIELDS
    }

    fn token_page_url(&self) -> &'static str {
        TOKEN_PAGE
    }

    fn credentials(&self) -> CredentialRecord {
        self.store.get(ProviderId::Dropbox)
    }

    fn is_connected(&self) -> bool {
        DropboxConfig::from_record(&self.credentials()).is_some()
    }

    async fn upload(&self, file: &MediaFile, progress: Option<&ProgressFn<'_>>) -> Result<UploadResult> {
        let config = self.config()?;
        let mut progress = ProgressReporter::new(progress);

        let file_name = unique_file_name(&file.name);
        let file_path = config.file_path(&file_name);

        progress.report(20, "Uploading to Dropbox");
        let metadata = self
            .client
            .upload(&config.access_token, &file_path, &file.data)
            .await?;

        progress.report(70, "Creating shared link");
        let url = self
            .resolve_shared_link(&config.access_token, &metadata.path_display)
            .await
            .map(|link| direct_content_url(&link))
            .unwrap_or_default();

        progress.report(100, "Upload complete");
        Ok(UploadResult {
            links: links::generate(&url, &file_name),
            direct_url: url,
            accelerated_url: None,
            file_name,
            provider_label: self.display_name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::memory::MemoryConfigStore;
    use crate::testing::{sample_png, StubTransport};
    use crate::provider::ProgressEvent;
    use serde_json::json;
    use std::sync::Mutex;

    fn provider(record: CredentialRecord) -> (DropboxProvider, Arc<StubTransport>) {
        let stub = StubTransport::new();
        let store = Arc::new(MemoryConfigStore::with_record(ProviderId::Dropbox, record));
        (DropboxProvider::new(store, stub.clone()), stub)
    }

    fn token() -> CredentialRecord {
        CredentialRecord::new().with("accessToken", "sl.token")
    }

    #[test]
    fn test_file_path_normalized() {
        let mut config = DropboxConfig::from_record(&token()).unwrap();
        assert_eq!(config.file_path("x.png"), "/ImageHosting/x.png");

        config.path = "Photos/".to_string();
        assert_eq!(config.file_path("x.png"), "/Photos/x.png");

        config.path = "/".to_string();
        assert_eq!(config.file_path("x.png"), "/x.png");
    }

    #[tokio::test]
    async fn test_upload_with_new_link() {
        let (provider, stub) = provider(token());
        stub.respond_json(200, json!({"id": "id:1", "path_display": "/ImageHosting/x (1).png"}));
        stub.respond_json(200, json!({"url": "https://www.dropbox.com/s/abc/x.png?dl=0"}));

        let result = provider.upload(&sample_png(), None).await.unwrap();

        let upload = stub.request(0);
        assert_eq!(upload.method, Method::Post);
        assert_eq!(upload.url, "https://content.dropboxapi.com/2/files/upload");
        assert_eq!(upload.header_value("Authorization"), Some("Bearer sl.token"));
        assert_eq!(upload.header_value("Content-Type"), Some("application/octet-stream"));
        let arg: serde_json::Value =
            serde_json::from_str(upload.header_value("Dropbox-API-Arg").unwrap()).unwrap();
        assert_eq!(
            arg,
            json!({
                "path": format!("/ImageHosting/{}", result.file_name),
                "mode": "add",
                "autorename": true
            })
        );

        let share = stub.request(1);
        assert_eq!(
            share.url,
            "https://api.dropboxapi.com/2/sharing/create_shared_link_with_settings"
        );
        let body: serde_json::Value = serde_json::from_slice(&share.body).unwrap();
        assert_eq!(
            body,
            json!({
                "path": "/ImageHosting/x (1).png",
                "settings": {"requested_visibility": "public"}
            })
        );

        assert_eq!(result.direct_url, "https://dl.dropboxusercontent.com/s/abc/x.png");
        assert_eq!(result.accelerated_url, None);
        assert_eq!(result.provider_label, "Dropbox");
    }

    #[tokio::test]
    async fn test_existing_link_fallback() {
        let (provider, stub) = provider(token());
        stub.respond_json(200, json!({"path_display": "/ImageHosting/x.png"}));
        stub.respond_json(409, json!({"error_summary": "shared_link_already_exists/.."}));
        stub.respond_json(200, json!({"links": [{"url": "https://www.dropbox.com/s/old?dl=0"}]}));

        let result = provider.upload(&sample_png(), None).await.unwrap();

        assert_eq!(stub.calls(), 3);
        assert_eq!(stub.request(2).url, "https://api.dropboxapi.com/2/sharing/list_shared_links");
        let body: serde_json::Value = serde_json::from_slice(&stub.request(2).body).unwrap();
        assert_eq!(body, json!({"path": "/ImageHosting/x.png"}));
        assert_eq!(result.direct_url, "https://dl.dropboxusercontent.com/s/old");
    }

    #[tokio::test]
    async fn test_no_link_degrades_to_empty_url() {
        let (provider, stub) = provider(token());
        stub.respond_json(200, json!({"path_display": "/ImageHosting/x.png"}));
        stub.respond(403, "");
        stub.respond_json(200, json!({"links": []}));

        let result = provider.upload(&sample_png(), None).await.unwrap();
        assert_eq!(result.direct_url, "");
        assert_eq!(result.links.direct, "");
    }

    #[tokio::test]
    async fn test_upload_errors_by_status() {
        let (provider, stub) = provider(token());
        stub.respond_json(401, json!({"error_summary": "expired_access_token/"}));
        let err = provider.upload(&sample_png(), None).await.unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
        assert!(err.to_string().contains("expired_access_token"));

        stub.respond(404, "");
        let err = provider.upload(&sample_png(), None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_upload_progress_reaches_100() {
        let (provider, stub) = provider(token());
        stub.respond_json(200, json!({"path_display": "/ImageHosting/x.png"}));
        stub.respond_json(200, json!({"url": "https://www.dropbox.com/s/abc/x.png?dl=0"}));

        let seen = Mutex::new(Vec::new());
        let sink: &ProgressFn = &|event: ProgressEvent| seen.lock().unwrap().push(event.percent);
        provider.upload(&sample_png(), Some(sink)).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![20, 70, 100]);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let (provider, stub) = provider(CredentialRecord::new().with("path", "/p"));
        let err = provider.upload(&sample_png(), None).await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert_eq!(stub.calls(), 0);
    }
}
