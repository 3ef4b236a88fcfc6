//! GitHub repository storage provider.
//!
//! Files are committed through the contents API and served from jsDelivr,
//! with raw.githubusercontent.com as the direct URL.

pub mod client;
pub mod provider;

pub use client::{GitHubClient, RepoInfo};
pub use provider::{GitHubConfig, GitHubProvider};
