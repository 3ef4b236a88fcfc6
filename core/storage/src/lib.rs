//! Storage backends for ImageHost.
//!
//! This crate provides a trait-based interface over the supported hosting
//! backends (GitHub, Google Drive, OneDrive, Dropbox), the registry that
//! tracks the active one, and the local stores for credentials and history.
//!
//! # Design Principles
//! - Provider isolation: wire details stay inside each backend module
//! - One transport: every request goes through an [`HttpTransport`]
//! - Uniform errors: every failure names the backend it came from

pub mod dropbox;
pub mod gdrive;
pub mod github;
pub mod history;
pub mod http;
pub mod links;
pub mod local;
pub mod memory;
pub mod naming;
pub mod onedrive;
pub mod provider;
pub mod registry;
pub mod store;

#[cfg(test)]
mod testing;

pub use history::{HistoryEntry, UploadHistory};
pub use http::{HttpTransport, ReqwestTransport};
pub use links::LinkSet;
pub use local::FileConfigStore;
pub use memory::MemoryConfigStore;
pub use provider::{ConfigForm, ProgressEvent, ProgressFn, StorageProvider, UploadResult};
pub use registry::ProviderRegistry;
pub use store::{ConfigStore, CredentialRecord};
