//! Common utilities and types shared across ImageHost crates.
//!
//! This module provides the error taxonomy and the small domain types
//! (provider identifiers, media files) every other crate builds on.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{format_file_size, guess_mime_type, FileCategory, MediaFile, ProviderId};
