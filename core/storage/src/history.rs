//! Local history of completed uploads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use imagehost_common::{Error, FileCategory, Result};

use crate::links::LinkSet;
use crate::provider::UploadResult;

/// Number of entries kept.
pub const HISTORY_LIMIT: usize = 100;

/// One completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub file_name: String,
    pub provider_label: String,
    /// Entries written before categories were recorded read as images.
    #[serde(default = "default_category")]
    pub category: FileCategory,
    pub links: LinkSet,
    pub direct_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerated_url: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_result(
        result: &UploadResult,
        category: FileCategory,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            file_name: result.file_name.clone(),
            provider_label: result.provider_label.clone(),
            category,
            links: result.links.clone(),
            direct_url: result.direct_url.clone(),
            accelerated_url: result.accelerated_url.clone(),
            uploaded_at,
        }
    }

    /// CDN URL if any, else the direct URL.
    pub fn preview_url(&self) -> &str {
        self.accelerated_url.as_deref().unwrap_or(&self.direct_url)
    }
}

fn default_category() -> FileCategory {
    FileCategory::Image
}

/// Upload history stored as a JSON array, newest first.
pub struct UploadHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UploadHistory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, newest first. A missing file is an empty history.
    pub async fn entries(&self) -> Result<Vec<HistoryEntry>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            Error::Serialization(format!(
                "Corrupt history file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Prepend an upload, dropping the oldest entries beyond the limit.
    pub async fn record(
        &self,
        result: &UploadResult,
        category: FileCategory,
    ) -> Result<HistoryEntry> {
        let _guard = self.write_lock.lock().await;

        let entry = HistoryEntry::from_result(result, category, Utc::now());
        let mut entries = self.entries().await?;
        entries.insert(0, entry.clone());
        entries.truncate(HISTORY_LIMIT);

        self.save(&entries).await?;
        Ok(entry)
    }

    /// Remove every entry.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.save(&[]).await
    }

    async fn save(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| Error::Serialization(format!("Failed to serialize history: {}", e)))?;
        tokio::fs::write(&self.path, json).await?;

        debug!("Wrote {} history entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}
