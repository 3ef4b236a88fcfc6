//! Google Drive storage provider implementation.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use imagehost_common::{Error, MediaFile, ProviderId, Result};

use crate::http::HttpTransport;
use crate::links;
use crate::naming::unique_file_name;
use crate::provider::{
    missing_required, FieldSpec, ProgressFn, ProgressReporter, StorageProvider, UploadResult,
};
use crate::store::{ConfigStore, CredentialRecord};

use super::client::{direct_url, DriveClient};

const TOKEN_PAGE: &str = "https://developers.google.com/oauthplayground/";

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("accessToken", "Access token", true),
    FieldSpec::optional("folderId", "Folder ID", None),
];

/// Google Drive provider configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GDriveConfig {
    pub access_token: String,
    /// Folder to upload into; Drive root when absent.
    pub folder_id: Option<String>,
}

impl GDriveConfig {
    pub fn from_record(record: &CredentialRecord) -> Option<Self> {
        Some(Self {
            access_token: record.get("accessToken")?.to_string(),
            folder_id: record.get("folderId").map(str::to_string),
        })
    }
}

/// Google Drive storage provider.
///
/// Uploads with one multipart request, then tries to make the file public.
pub struct GDriveProvider {
    store: Arc<dyn ConfigStore>,
    client: DriveClient,
}

impl GDriveProvider {
    pub fn new(store: Arc<dyn ConfigStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            store,
            client: DriveClient::new(transport),
        }
    }

    fn config(&self) -> Result<GDriveConfig> {
        let record = self.credentials();
        GDriveConfig::from_record(&record).ok_or_else(|| Error::Config {
            provider: self.display_name().to_string(),
            message: format!("missing {}", missing_required(FIELDS, &record).join(", ")),
        })
    }

    /// Grant public read access. The file stays private if this fails.
    async fn best_effort_share_publicly(&self, token: &str, file_id: &str) {
        if let Err(e) = self.client.share_publicly(token, file_id).await {
            warn!("Could not make {} public: {}", file_id, e);
        }
    }
}

#[async_trait]
impl StorageProvider for GDriveProvider {
    fn id(&self) -> ProviderId {
        ProviderId::GoogleDrive
    }

    fn fields(&self) -> &'static [FieldSpec] {
        FIELDS
    }

    fn token_page_url(&self) -> &'static str {
        TOKEN_PAGE
    }

    fn credentials(&self) -> CredentialRecord {
        self.store.get(ProviderId::GoogleDrive)
    }

    fn is_connected(&self) -> bool {
        GDriveConfig::from_record(&self.credentials()).is_some()
    }

    async fn upload(&self, file: &MediaFile, progress: Option<&ProgressFn<'_>>) -> Result<UploadResult> {
        let config = self.config()?;
        let mut progress = ProgressReporter::new(progress);

        let file_name = unique_file_name(&file.name);

        progress.report(20, "Uploading to Google Drive");
        let uploaded = self
            .client
            .upload_multipart(
                &config.access_token,
                &file_name,
                &file.mime_type,
                config.folder_id.as_deref(),
                &file.data,
            )
            .await?;

        progress.report(70, "Setting permissions");
        self.best_effort_share_publicly(&config.access_token, &uploaded.id)
            .await;

        progress.report(90, "Resolving links");
        let url = direct_url(&uploaded.id);

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
