//! OneDrive storage provider implementation.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use imagehost_common::{Error, MediaFile, ProviderId, Result};

use crate::http::HttpTransport;
use crate::links;
use crate::naming::{join_path, unique_file_name};
use crate::provider::{
    missing_required, FieldSpec, ProgressFn, ProgressReporter, StorageProvider, UploadResult,
};
use crate::store::{ConfigStore, CredentialRecord};

use super::client::{share_content_url, DriveItem, GraphClient};

const TOKEN_PAGE: &str = "https://developer.microsoft.com/en-us/graph/graph-explorer";

const DEFAULT_PATH: &str = "ImageHosting";

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("accessToken", "Access token", true),
    FieldSpec::optional("path", "Folder", Some(DEFAULT_PATH)),
];

/// OneDrive settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    pub access_token: String,
    /// Folder relative to the drive root.
    pub path: String,
}

impl GraphConfig {
    pub fn from_record(record: &CredentialRecord) -> Option<Self> {
        Some(Self {
            access_token: record.get("accessToken")?.to_string(),
            path: record.get_or("path", DEFAULT_PATH).to_string(),
        })
    }
}

/// Stores files in the signed-in user's OneDrive.
pub struct GraphProvider {
    store: Arc<dyn ConfigStore>,
    client: GraphClient,
}

impl GraphProvider {
    pub fn new(store: Arc<dyn ConfigStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            store,
            client: GraphClient::new(transport),
        }
    }

    fn config(&self) -> Result<GraphConfig> {
        let record = self.credentials();
        GraphConfig::from_record(&record).ok_or_else(|| Error::Config {
            provider: self.display_name().to_string(),
            message: format!("missing {}", missing_required(FIELDS, &record).join(", ")),
        })
    }

    /// Public URL of an uploaded item.
    ///
    /// Falls back to the item's own web URL, then to an empty string, when
    /// no anonymous link can be created.
    async fn resolve_public_url(&self, token: &str, item: &DriveItem) -> String {
        let fallback = || item.web_url.clone().unwrap_or_default();

        match self.client.create_view_link(token, &item.id).await {
            Ok(link) => share_content_url(&link).unwrap_or_else(fallback),
            Err(e) => {
                warn!("Could not create sharing link for {}: {}", item.id, e);
                fallback()
            }
        }
    }
}

#[async_trait]
impl StorageProvider for GraphProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OneDrive
    }

    fn fields(&self) -> &'static [FieldSpec] {
        FIELDS
    }

    fn token_page_url(&self) -> &'static str {
        TOKEN_PAGE
    }

    fn credentials(&self) -> CredentialRecord {
        self.store.get(ProviderId::OneDrive)
    }

    fn is_connected(&self) -> bool {
        GraphConfig::from_record(&self.credentials()).is_some()
    }

    async fn upload(&self, file: &MediaFile, progress: Option<&ProgressFn<'_>>) -> Result<UploadResult> {
        let config = self.config()?;
        let mut progress = ProgressReporter::new(progress);

        let file_name = unique_file_name(&file.name);
        let file_path = join_path(&config.path, &file_name);

        progress.report(20, "Uploading to OneDrive");
        let item = self
            .client
            .put_content(&config.access_token, &file_path, &file.mime_type, &file.data)
            .await?;

        progress.report(70, "Creating sharing link");
        let url = self.resolve_public_url(&config.access_token, &item).await;

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
