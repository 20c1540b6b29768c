//! S3 object storage client.
//!
//! This crate provides:
//! - Bucket discovery and idempotent creation
//! - Recursive directory upload (site bundles)
//! - Prefix listing and batch deletion
//! - Streaming artifact download to disk

pub mod client;
pub mod error;

pub use client::{content_type_for, ObjectInfo, S3Client, S3Config};
pub use error::{StorageError, StorageResult};
