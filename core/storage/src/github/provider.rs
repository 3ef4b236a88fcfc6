//! GitHub repository storage provider implementation.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
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

use super::client::{cdn_url, raw_url, GitHubClient, RepoInfo};

/// Page that creates a classic token with the `repo` scope.
const TOKEN_PAGE: &str =
    "https://github.com/settings/tokens/new?scopes=repo&description=Image%20Hosting%20Tool";

const DEFAULT_PATH: &str = "images";
const DEFAULT_BRANCH: &str = "main";

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("token", "Personal access token", true),
    FieldSpec::required("owner", "Repository owner", false),
    FieldSpec::required("repo", "Repository name", false),
    FieldSpec::optional("path", "Folder", Some(DEFAULT_PATH)),
    FieldSpec::optional("branch", "Branch", Some(DEFAULT_BRANCH)),
];

/// Resolved GitHub settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    pub token: String,
    pub owner: String,
    pub repo: String,
    /// Folder inside the repository.
    pub path: String,
    pub branch: String,
}

impl GitHubConfig {
    /// Build from a credential record, or `None` if a required field is absent.
    pub fn from_record(record: &CredentialRecord) -> Option<Self> {
        Some(Self {
            token: record.get("token")?.to_string(),
            owner: record.get("owner")?.to_string(),
            repo: record.get("repo")?.to_string(),
            path: record.get_or("path", DEFAULT_PATH).to_string(),
            branch: record.get_or("branch", DEFAULT_BRANCH).to_string(),
        })
    }
}

/// Stores files in a GitHub repository through the contents API.
pub struct GitHubProvider {
    store: Arc<dyn ConfigStore>,
    client: GitHubClient,
}

impl GitHubProvider {
    pub fn new(store: Arc<dyn ConfigStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            store,
            client: GitHubClient::new(transport),
        }
    }

    /// Current settings.
    ///
    /// # Errors
    /// - `Config` naming the missing fields
    pub fn config(&self) -> Result<GitHubConfig> {
        let record = self.credentials();
        GitHubConfig::from_record(&record).ok_or_else(|| Error::Config {
            provider: self.display_name().to_string(),
            message: format!("missing {}", missing_required(FIELDS, &record).join(", ")),
        })
    }

    /// Check that the token can see the configured repository.
    ///
    /// Unlike the probe run before uploads, every failure is reported.
    pub async fn test_connection(&self) -> Result<RepoInfo> {
        let config = self.config()?;
        self.client.get_repository(&config).await
    }

    /// Fail fast on a missing repository or a rejected token.
    async fn probe_repository(&self, config: &GitHubConfig) -> Result<()> {
        match self.client.get_repository(config).await {
            Ok(info) => {
                debug!("Repository {} reachable", info.full_name);
                Ok(())
            }
            Err(e @ (Error::NotFound { .. } | Error::Authentication { .. })) => Err(e),
            Err(e) => {
                warn!("Repository check skipped: {}", e);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl StorageProvider for GitHubProvider {
    fn id(&self) -> ProviderId {
        ProviderId::GitHub
    }

    fn fields(&self) -> &'static [FieldSpec] {
        FIELDS
    }

    fn token_page_url(&self) -> &'static str {
        TOKEN_PAGE
    }

    fn credentials(&self) -> CredentialRecord {
        self.store.get(ProviderId::GitHub)
    }

    fn is_connected(&self) -> bool {
        GitHubConfig::from_record(&self.credentials()).is_some()
    }

    async fn upload(&self, file: &MediaFile, progress: Option<&ProgressFn<'_>>) -> Result<UploadResult> {
        let config = self.config()?;
        let mut progress = ProgressReporter::new(progress);

        progress.report(10, "Checking repository");
        self.probe_repository(&config).await?;

        progress.report(20, "Encoding file");
        let content = STANDARD.encode(&file.data);
        let file_name = unique_file_name(&file.name);
        let file_path = join_path(&config.path, &file_name);

        progress.report(40, "Uploading to GitHub");
        self.client
            .put_contents(
                &config,
                &file_path,
                content,
                format!("Upload image: {}", file_name),
            )
            .await?;

        progress.report(80, "Resolving links");
        let cdn = cdn_url(&config.owner, &config.repo, &config.branch, &file_path);
        let raw = raw_url(&config.owner, &config.repo, &config.branch, &file_path);

        progress.report(100, "Upload complete");
        Ok(UploadResult {
            links: links::generate(&cdn, &file_name),
            direct_url: raw,
            accelerated_url: Some(cdn),
            file_name,
            provider_label: self.display_name().to_string(),
        })
    }
}
