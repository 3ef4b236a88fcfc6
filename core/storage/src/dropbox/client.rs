//! Dropbox API v2 client.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use imagehost_common::{Error, Result};

use crate::http::{
    generic_status_message, network_error, status_error, HttpRequest, HttpResponse, HttpTransport,
};

/// Content upload endpoint.
const CONTENT_API_BASE: &str = "https://content.dropboxapi.com/2";
/// RPC endpoint.
const API_BASE: &str = "https://api.dropboxapi.com/2";

const PROVIDER: &str = "Dropbox";

/// Metadata of an uploaded file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub id: Option<String>,
    /// Final path, after any autorename.
    pub path_display: String,
}

#[derive(Debug, Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: &'static str,
    autorename: bool,
}

#[derive(Debug, Deserialize)]
struct SharedLink {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SharedLinkList {
    #[serde(default)]
    links: Vec<SharedLink>,
}

#[derive(Debug, Deserialize)]
struct DropboxErrorBody {
    #[serde(default)]
    error_summary: Option<String>,
}

/// Dropbox API client.
pub struct DropboxClient {
    transport: Arc<dyn HttpTransport>,
}

impl DropboxClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Upload a file, renaming it if `path` is taken.
    pub async fn upload(&self, token: &str, path: &str, data: &[u8]) -> Result<FileMetadata> {
        let url = format!("{}/files/upload", CONTENT_API_BASE);
        debug!("POST {} ({})", url, path);

        let arg = UploadArg {
            path,
            mode: "add",
            autorename: true,
        };

        let request = HttpRequest::post(url)
            .bearer(token)
            .header("Content-Type", "application/octet-stream")
            .header("Dropbox-API-Arg", header_safe_json(&arg)?)
            .body(data.to_vec());

        self.send(request).await
    }

    /// Create a public shared link for a file.
    pub async fn create_shared_link(&self, token: &str, path: &str) -> Result<String> {
        let url = format!("{}/sharing/create_shared_link_with_settings", API_BASE);
        debug!("POST {}", url);

        let request = HttpRequest::post(url).bearer(token).json(&serde_json::json!({
            "path": path,
            "settings": {"requested_visibility": "public"}
        }))?;

        let link: SharedLink = self.send(request).await?;
        Ok(link.url)
    }

    /// First existing shared link for a file, if any.
    pub async fn first_shared_link(&self, token: &str, path: &str) -> Result<Option<String>> {
        let url = format!("{}/sharing/list_shared_links", API_BASE);
        debug!("POST {}", url);

        let request = HttpRequest::post(url)
            .bearer(token)
            .json(&serde_json::json!({"path": path}))?;

        let list: SharedLinkList = self.send(request).await?;
        Ok(list.links.into_iter().next().map(|l| l.url))
    }

    async fn send<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| network_error(PROVIDER, e))?;
        handle_response(response)
    }
}

/// Turn a share page link into a link serving the raw bytes.
pub fn direct_content_url(shared_link: &str) -> String {
    shared_link
        .replacen("www.dropbox.com", "dl.dropboxusercontent.com", 1)
        .replace("?dl=0&", "?")
        .replace("?dl=0", "")
        .replace("&dl=0", "")
}

/// JSON with every non-ASCII character escaped, as HTTP header values must be ASCII.
fn header_safe_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)
        .map_err(|e| Error::Serialization(format!("Failed to encode Dropbox-API-Arg: {}", e)))?;

    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(out)
}

fn handle_response<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
    if response.is_success() {
        return response.json().map_err(|e| Error::Upload {
            provider: PROVIDER.to_string(),
            message: format!("Failed to parse response: {}", e),
        });
    }

    let message = response
        .json::<DropboxErrorBody>()
        .ok()
        .and_then(|b| b.error_summary)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| generic_status_message(response.status));
    Err(status_error(PROVIDER, response.status, message))
}
