//! Google Drive API client.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use imagehost_common::{Error, Result};

use crate::http::{
    encode_path, generic_status_message, nested_error_message, network_error, status_error,
    HttpRequest, HttpResponse, HttpTransport,
};

/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
/// Publicly viewable download endpoint.
const DIRECT_VIEW_BASE: &str = "https://drive.google.com/uc?export=view&id=";

const PROVIDER: &str = "Google Drive";

/// File metadata returned by the upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// File ID.
    pub id: String,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub web_content_link: Option<String>,
}

/// Metadata part of a multipart upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadMetadata<'a> {
    name: &'a str,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<[&'a str; 1]>,
}

/// Google Drive API client.
pub struct DriveClient {
    transport: Arc<dyn HttpTransport>,
}

impl DriveClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Upload a file with a single `multipart/related` request.
    ///
    /// # Errors
    /// - Status-classified error carrying Google's `error.message` if sent
    /// - `Network` when no response was received
    pub async fn upload_multipart(
        &self,
        token: &str,
        name: &str,
        mime_type: &str,
        parent_id: Option<&str>,
        data: &[u8],
    ) -> Result<DriveFile> {
        let url = format!(
            "{}/files?uploadType=multipart&fields=id,webViewLink,webContentLink",
            DRIVE_UPLOAD_BASE
        );
        debug!("POST {}", url);

        let metadata = UploadMetadata {
            name,
            mime_type,
            parents: parent_id.map(|id| [id]),
        };
        let metadata_json = serde_json::to_vec(&metadata)
            .map_err(|e| Error::Serialization(format!("Failed to serialize metadata: {}", e)))?;

        let boundary = format!("imagehost-{}", Uuid::new_v4().simple());
        let body = multipart_body(&boundary, &metadata_json, mime_type, data);

        let request = HttpRequest::post(url)
            .bearer(token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        handle_response(response)
    }

    /// Grant `anyone` read access to a file.
    pub async fn share_publicly(&self, token: &str, file_id: &str) -> Result<()> {
        let url = format!("{}/files/{}/permissions", DRIVE_API_BASE, encode_path(file_id));
        debug!("POST {}", url);

        let request = HttpRequest::post(url)
            .bearer(token)
            .json(&serde_json::json!({"role": "reader", "type": "anyone"}))?;

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        handle_response::<serde_json::Value>(response).map(|_| ())
    }
}

/// Publicly viewable URL of a file.
pub fn direct_url(file_id: &str) -> String {
    format!("{}{}", DIRECT_VIEW_BASE, file_id)
}

/// Two-part `multipart/related` body: JSON metadata then the raw bytes.
fn multipart_body(boundary: &str, metadata_json: &[u8], mime_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + metadata_json.len() + 256);

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata_json);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}--", boundary).as_bytes());
    body
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_body("b", br#"{"name":"x.png"}"#, "image/png", b"DATA");
        let text = String::from_utf8(body).unwrap();

        assert_eq!(
            text,
            "--b\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"x.png\"}\r\n\
             --b\r\nContent-Type: image/png\r\n\r\nDATA\r\n--b--"
        );
    }

    #[test]
    fn test_metadata_parents_optional() {
        let without = UploadMetadata {
            name: "x.png",
            mime_type: "image/png",
            parents: None,
        };
        assert_eq!(
            serde_json::to_value(&without).unwrap(),
            serde_json::json!({"name": "x.png", "mimeType": "image/png"})
        );

        let with = UploadMetadata {
            parents: Some(["folder"]),
            ..without
        };
        assert_eq!(serde_json::to_value(&with).unwrap()["parents"], serde_json::json!(["folder"]));
    }

    #[test]
    fn test_drive_file_deserialization() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"abc","webViewLink":"https://drive.google.com/file/d/abc/view"}"#,
        )
        .unwrap();
        assert_eq!(file.id, "abc");
        assert!(file.web_view_link.is_some());
        assert!(file.web_content_link.is_none());
    }

    #[test]
    fn test_handle_response_uses_error_message() {
        let err = handle_response::<DriveFile>(HttpResponse::new(
            403,
            r#"{"error":{"code":403,"message":"Insufficient Permission"}}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert!(err.to_string().contains("Insufficient Permission"));

        let err = handle_response::<DriveFile>(HttpResponse::new(500, "")).unwrap_err();
        assert!(matches!(err, Error::Upload { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_direct_url() {
        assert_eq!(direct_url("abc"), "https://drive.google.com/uc?export=view&id=abc");
    }
}
