//! Presentation formats for an uploaded file's public URL.

use serde::{Deserialize, Serialize};

/// The three link formats offered for every upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSet {
    /// `![name](url)`
    pub markdown: String,
    /// `<img src="url" alt="name">`
    pub html: String,
    /// The URL itself.
    pub direct: String,
}

/// Build the link formats for `url`, labelled with `file_name`.
pub fn generate(url: &str, file_name: &str) -> LinkSet {
    LinkSet {
        markdown: format!("![{}]({})", file_name, url),
        html: format!("<img src=\"{}\" alt=\"{}\">", url, file_name),
        direct: url.to_string(),
    }
}
