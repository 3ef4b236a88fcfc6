//! GitHub contents API client.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use imagehost_common::{Error, Result};

use crate::http::{encode_path, network_error, status_error, HttpRequest, HttpResponse, HttpTransport};

use super::provider::GitHubConfig;

/// GitHub REST API base URL.
const GITHUB_API_BASE: &str = "https://api.github.com";
/// jsDelivr mirror of public GitHub repositories.
const CDN_BASE: &str = "https://cdn.jsdelivr.net/gh";
/// Raw file host.
const RAW_BASE: &str = "https://raw.githubusercontent.com";

const ACCEPT_V3: &str = "application/vnd.github.v3+json";
const PROVIDER: &str = "GitHub";

/// Repository metadata returned by `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoInfo {
    pub full_name: String,
    pub default_branch: String,
}

/// Body of `PUT /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: String,
    content: String,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// GitHub API client.
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
}

impl GitHubClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// GitHub wants `token`, not `Bearer`, for classic tokens.
    fn authorize(request: HttpRequest, token: &str) -> HttpRequest {
        request
            .header("Authorization", format!("token {}", token))
            .header("Accept", ACCEPT_V3)
    }

    /// Fetch repository metadata.
    ///
    /// # Errors
    /// - `NotFound` if the repository does not exist or is invisible to the token
    /// - `Authentication` if the token is rejected
    /// - `PermissionDenied` if the token lacks access
    pub async fn get_repository(&self, config: &GitHubConfig) -> Result<RepoInfo> {
        let url = format!(
            "{}/repos/{}/{}",
            GITHUB_API_BASE,
            encode_path(&config.owner),
            encode_path(&config.repo)
        );
        debug!("GET {}", url);

        let response = self
            .transport
            .send(Self::authorize(HttpRequest::get(url), &config.token))
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        if response.is_success() {
            return response.json().map_err(|e| Error::Upload {
                provider: PROVIDER.to_string(),
                message: format!("unreadable repository response: {}", e),
            });
        }

        let message = match response.status {
            404 => format!(
                "repository {}/{} does not exist, check owner and repository name",
                config.owner, config.repo
            ),
            401 => "token is invalid or expired".to_string(),
            403 => "token lacks permission, make sure it has the repo scope".to_string(),
            status => format!("connection failed (HTTP {})", status),
        };
        Err(status_error(PROVIDER, response.status, message))
    }

    /// Create a file at `file_path` on the configured branch.
    pub async fn put_contents(
        &self,
        config: &GitHubConfig,
        file_path: &str,
        content_base64: String,
        commit_message: String,
    ) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            GITHUB_API_BASE,
            encode_path(&config.owner),
            encode_path(&config.repo),
            encode_path(file_path)
        );
        debug!("PUT {}", url);

        let body = PutContentsRequest {
            message: commit_message,
            content: content_base64,
            branch: &config.branch,
        };
        let request = Self::authorize(HttpRequest::put(url), &config.token).json(&body)?;

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        if response.is_success() {
            Ok(())
        } else {
            Err(status_error(PROVIDER, response.status, upload_error_message(&response)))
        }
    }
}

/// Message for a failed contents write: the API's own message if it sent
/// one, else a canned hint keyed by status.
fn upload_error_message(response: &HttpResponse) -> String {
    if let Some(message) = response
        .json::<GitHubErrorBody>()
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
    {
        return message;
    }

    match response.status {
        400 => "invalid request, check the repository name and branch".to_string(),
        401 => "token is invalid or expired, reconfigure it".to_string(),
        403 => "no permission, make sure the token has the repo scope".to_string(),
        404 => "repository does not exist, check owner and repository name".to_string(),
        422 => "file already exists or the path is invalid".to_string(),
        status => format!("upload failed (HTTP {})", status),
    }
}

/// jsDelivr URL for a file in a repository.
pub fn cdn_url(owner: &str, repo: &str, branch: &str, file_path: &str) -> String {
    format!("{}/{}/{}@{}/{}", CDN_BASE, owner, repo, branch, file_path)
}

/// raw.githubusercontent.com URL for a file in a repository.
pub fn raw_url(owner: &str, repo: &str, branch: &str, file_path: &str) -> String {
    format!("{}/{}/{}/{}/{}", RAW_BASE, owner, repo, branch, file_path)
}
