//! Cached Asset Module
//!
//! Immutable, fully buffered file content published into the [`FileCache`].
//!
//! [`FileCache`]: crate::cache::FileCache

use std::fs::{Metadata, Permissions};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

// == Cached Asset ==
/// A resolved file held in memory for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct CachedAsset {
    /// Canonical path chosen by the fallback chain
    name: String,
    /// Shared buffer, every clone is an independent view
    content: Bytes,
    /// Last modification time of the source file
    modified: SystemTime,
    /// Permission bits of the source file
    permissions: Permissions,
}

impl CachedAsset {
    // == Constructor ==
    /// Wraps `content` read from a file with metadata `meta`.
    ///
    /// The length is taken from `content`, not from `meta`, since templated
    /// content differs in size from the file on disk.
    pub fn new(name: impl Into<String>, content: Vec<u8>, meta: &Metadata) -> Self {
        Self {
            name: name.into(),
            content: Bytes::from(content),
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
            permissions: meta.permissions(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base file name, used for cache rule matching.
    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }

    /// A new view over the shared buffer with its own read position.
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }

    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }
}

/// Last path segment of a `/`-separated path.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
