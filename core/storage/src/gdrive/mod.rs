//! Google Drive storage provider.
//!
//! Uses a caller-supplied access token; no refresh is attempted.

pub mod client;
pub mod provider;

pub use client::{DriveClient, DriveFile};
pub use provider::{GDriveConfig, GDriveProvider};
