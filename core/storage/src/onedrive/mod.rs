//! OneDrive storage provider over Microsoft Graph.

pub mod client;
pub mod provider;

pub use client::{DriveItem, GraphClient};
pub use provider::{GraphConfig, GraphProvider};
