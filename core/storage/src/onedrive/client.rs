//! Microsoft Graph drive client.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use imagehost_common::{Error, Result};

use crate::http::{
    encode_path, generic_status_message, nested_error_message, network_error, status_error,
    HttpRequest, HttpResponse, HttpTransport,
};

/// Graph API base URL.
const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
/// Share content endpoint serving the raw bytes of a shared item.
const SHARES_BASE: &str = "https://api.onedrive.com/v1.0/shares";

const PROVIDER: &str = "OneDrive";

/// Item returned by a content upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateLinkResponse {
    link: SharingLink,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharingLink {
    #[serde(default)]
    web_url: Option<String>,
}

/// Microsoft Graph client scoped to the signed-in user's drive.
pub struct GraphClient {
    transport: Arc<dyn HttpTransport>,
}

impl GraphClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Create or replace the file at `path` relative to the drive root.
    pub async fn put_content(
        &self,
        token: &str,
        path: &str,
        mime_type: &str,
        data: &[u8],
    ) -> Result<DriveItem> {
        let url = format!(
            "{}/me/drive/root:/{}:/content",
            GRAPH_API_BASE,
            encode_path(path)
        );
        debug!("PUT {}", url);

        let request = HttpRequest::put(url)
            .bearer(token)
            .header("Content-Type", mime_type)
            .body(data.to_vec());

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        handle_response(response)
    }

    /// Create an anonymous view link and return its web URL.
    ///
    /// # Errors
    /// - Status-classified error if Graph refuses the link
    /// - `Upload` if the response carries no URL
    pub async fn create_view_link(&self, token: &str, item_id: &str) -> Result<String> {
        let url = format!(
            "{}/me/drive/items/{}/createLink",
            GRAPH_API_BASE,
            encode_path(item_id)
        );
        debug!("POST {}", url);

        let request = HttpRequest::post(url)
            .bearer(token)
            .json(&serde_json::json!({"type": "view", "scope": "anonymous"}))?;

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        let created: CreateLinkResponse = handle_response(response)?;
        created
            .link
            .web_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Upload {
                provider: PROVIDER.to_string(),
                message: "sharing link response has no URL".to_string(),
            })
    }
}

/// Raw content URL for a sharing link: its last path segment is the share id.
pub fn share_content_url(share_link: &str) -> Option<String> {
    let share_id = share_link
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())?;
    Some(format!("{}/{}/root/content", SHARES_BASE, share_id))
}

fn handle_response<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
    if response.is_success() {
        return response.json().map_err(|e| Error::Upload {
            provider: PROVIDER.to_string(),
            message: format!("Failed to parse response: {}", e),
        });
    }

    let message = nested_error_message(&response)
        .unwrap_or_else(|| generic_status_message(response.status));
    Err(status_error(PROVIDER, response.status, message))
}
