//! Asset Resolver
//!
//! Implements the `try_files` style fallback chain:
//!
//! 1. the request path itself
//! 2. the request path with `.html` appended
//! 3. `/<lang>-<index>` for every Accept-Language tag
//! 4. `/<index>`
//!
//! Every candidate is looked up in the [`FileCache`] before the filesystem.

use std::fs::Metadata;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use tokio::fs::File;
use tracing::{debug, trace};

use crate::cache::{CachedAsset, FileCache};
use crate::error::{Result, ServeError};

/// Content found for a request.
#[derive(Debug)]
pub enum Content {
    /// Previously published asset
    Cached(Arc<CachedAsset>),
    /// Open file handle straight from the filesystem
    Fresh { file: File, metadata: Metadata },
}

/// Outcome of a successful resolution.
#[derive(Debug)]
pub struct Resolution {
    /// Canonical path, may differ from the requested path
    pub name: String,
    pub content: Content,
}

impl Resolution {
    pub fn is_cached(&self) -> bool {
        matches!(self.content, Content::Cached(_))
    }
}

// == Asset Resolver ==
#[derive(Debug, Clone)]
pub struct AssetResolver {
    root: PathBuf,
    index: String,
    cache: Arc<FileCache>,
}

impl AssetResolver {
    pub fn new(root: impl Into<PathBuf>, index: impl Into<String>, cache: Arc<FileCache>) -> Self {
        Self {
            root: root.into(),
            index: index.into(),
            cache,
        }
    }

    /// Ordered candidate paths for `path`, which must already be cleaned.
    pub fn candidates(&self, path: &str, accept_language: Option<&str>) -> Vec<String> {
        let mut candidates = vec![path.to_string()];
        if !path.ends_with(".html") {
            candidates.push(format!("{}.html", path));
        }
        for tag in accept_language.map(language_tags).unwrap_or_default() {
            candidates.push(format!("/{}-{}", tag, self.index));
        }
        candidates.push(format!("/{}", self.index));
        candidates
    }

    // == Resolve ==
    /// Walks the fallback chain. Missing files and directories advance the
    /// chain; any other I/O error aborts it.
    pub async fn resolve(&self, path: &str, accept_language: Option<&str>) -> Result<Resolution> {
        for name in self.candidates(path, accept_language) {
            trace!("Try cache lookup for file {}", name);
            if let Some(asset) = self.cache.lookup(&name).await {
                debug!("Resolved {} to cached {}", path, name);
                return Ok(Resolution {
                    name,
                    content: Content::Cached(asset),
                });
            }

            if let Some((file, metadata)) = self.open(&name).await? {
                debug!("Resolved {} to file {}", path, name);
                return Ok(Resolution {
                    name,
                    content: Content::Fresh { file, metadata },
                });
            }
        }
        Err(ServeError::NotFound(path.to_string()))
    }

    /// Filesystem location of a canonical path.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.root.join(name.trim_start_matches('/'))
    }

    /// Opens a regular file; `None` when absent or a directory.
    async fn open(&self, name: &str) -> Result<Option<(File, Metadata)>> {
        let path = self.file_path(name);
        trace!("Try opening file {}", path.display());

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if is_absent(&e) => return Ok(None),
            Err(e) => return Err(ServeError::from_io(name, e)),
        };
        if metadata.is_dir() {
            return Ok(None);
        }

        match File::open(&path).await {
            Ok(file) => Ok(Some((file, metadata))),
            Err(e) if is_absent(&e) => Ok(None),
            Err(e) => Err(ServeError::from_io(name, e)),
        }
    }
}

fn is_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Language tags from an Accept-Language header, in header order.
///
/// `"en-US,en;q=0.5"` yields `["en-us", "en"]`. Tags that could leave the
/// root directory are dropped.
pub fn language_tags(header: &str) -> Vec<String> {
    header
        .split(',')
        .map(|entry| entry.split(';').next().unwrap_or(""))
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| {
            !tag.is_empty() && !tag.contains(|c: char| c == '/' || c == '\\') && !tag.contains("..")
        })
        .collect()
}

/// Percent-decodes and lexically cleans a request path into a rooted path
/// without `.`/`..` segments. `None` for undecodable or NUL-bearing input.
pub fn normalize_request_path(raw: &str) -> Option<String> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    if decoded.contains('\0') {
        return None;
    }
    Some(clean_path(&decoded))
}

/// Lexical path cleaning rooted at `/`, so `..` never climbs above the root.
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}
