//! Common types used throughout ImageHost.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Identifier of a supported storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[default]
    GitHub,
    GoogleDrive,
    OneDrive,
    Dropbox,
}

impl ProviderId {
    /// All providers, in display order.
    pub const ALL: [ProviderId; 4] = [
        ProviderId::GitHub,
        ProviderId::GoogleDrive,
        ProviderId::OneDrive,
        ProviderId::Dropbox,
    ];

    /// Stable identifier used as the persistence key.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::GitHub => "github",
            ProviderId::GoogleDrive => "googledrive",
            ProviderId::OneDrive => "onedrive",
            ProviderId::Dropbox => "dropbox",
        }
    }

    /// Human readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::GitHub => "GitHub",
            ProviderId::GoogleDrive => "Google Drive",
            ProviderId::OneDrive => "OneDrive",
            ProviderId::Dropbox => "Dropbox",
        }
    }

    /// Largest file the backend accepts through the upload path used here.
    ///
    /// GitHub's contents API carries base64, which inflates the payload,
    /// hence the lower ceiling.
    pub fn max_file_size(&self) -> u64 {
        const MIB: u64 = 1024 * 1024;
        match self {
            ProviderId::GitHub => 25 * MIB,
            ProviderId::GoogleDrive => 100 * MIB,
            ProviderId::OneDrive => 100 * MIB,
            ProviderId::Dropbox => 150 * MIB,
        }
    }

    /// Look up a provider by its identifier.
    pub fn parse(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == id)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s).ok_or_else(|| {
            crate::Error::InvalidInput(format!(
                "Unknown provider '{}', expected one of: github, googledrive, onedrive, dropbox",
                s
            ))
        })
    }
}

/// Broad media category, used for validation and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Unknown,
}

impl FileCategory {
    /// Classify a MIME type.
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            FileCategory::Image
        } else if mime_type.starts_with("video/") {
            FileCategory::Video
        } else {
            FileCategory::Unknown
        }
    }
}

/// A file selected for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Original file name, including extension.
    pub name: String,
    /// MIME type sent to backends that want one.
    pub mime_type: String,
    /// Complete file content.
    pub data: Vec<u8>,
}

impl MediaFile {
    /// Create a media file from in-memory parts.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                crate::Error::InvalidInput(format!("Not a file path: {}", path.display()))
            })?
            .to_string();
        let data = tokio::fs::read(path).await?;
        let mime_type = guess_mime_type(&name).to_string();
        Ok(Self::new(name, mime_type, data))
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Media category derived from the MIME type.
    pub fn category(&self) -> FileCategory {
        FileCategory::from_mime(&self.mime_type)
    }
}

impl fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Guess a MIME type from a file name's extension.
pub fn guess_mime_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

/// Format a byte count for humans, e.g. `1.50 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.2} KB", b / KB)
    } else if b < KB * KB * KB {
        format!("{:.2} MB", b / (KB * KB))
    } else {
        format!("{:.2} GB", b / (KB * KB * KB))
    }
}
