//! Dropbox storage provider.

pub mod client;
pub mod provider;

pub use client::{direct_content_url, DropboxClient, FileMetadata};
pub use provider::{DropboxConfig, DropboxProvider};
