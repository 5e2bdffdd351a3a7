//! Filesystem Object Store
//!
//! Every object is one regular file at `<root>/<bucket>/<key>`. Nothing is
//! cached: each call touches the filesystem directly, so concurrent writers
//! to the same key race and the last filesystem operation wins.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Buf;
use futures::Stream;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::{ReaderStream, StreamReader};

use super::resolver::{self, PathError};
use crate::error::{Error, Result};

/// Write buffer used when streaming an upload to disk
const UPLOAD_BUFFER_SIZE: usize = 64 * 1024;

/// Bucket/key pair addressed by a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

/// Why a request path could not be split into bucket and key
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRefError {
    #[error("missing bucket")]
    MissingBucket,

    #[error("missing key")]
    MissingKey,
}

impl ObjectRef {
    /// Split a request path into bucket and key.
    ///
    /// One leading `/` is stripped, then the remainder is split on the first
    /// `/`. The key keeps any further separators.
    pub fn parse(path: &str) -> std::result::Result<Self, ObjectRefError> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let (bucket, key) = match trimmed.split_once('/') {
            Some((bucket, key)) => (bucket, Some(key)),
            None => (trimmed, None),
        };

        if bucket.is_empty() {
            return Err(ObjectRefError::MissingBucket);
        }

        match key {
            Some(key) if !key.is_empty() => Ok(Self {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(ObjectRefError::MissingKey),
        }
    }

    /// Last path segment of the key, ignoring trailing separators
    pub fn file_name(&self) -> &str {
        let trimmed = self.key.trim_end_matches('/');
        if trimmed.is_empty() {
            return "/";
        }
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Filesystem failures while serving an object
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to create directories for {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to create {path:?}: {source}")]
    CreateFile { path: PathBuf, source: io::Error },

    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to open {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to remove {path:?}: {source}")]
    Remove { path: PathBuf, source: io::Error },
}

impl StoreError {
    /// Whether the underlying cause is a missing file or directory
    pub fn is_not_found(&self) -> bool {
        let source = match self {
            StoreError::CreateDir { source, .. }
            | StoreError::CreateFile { source, .. }
            | StoreError::Write { source, .. }
            | StoreError::Open { source, .. }
            | StoreError::Remove { source, .. } => source,
        };
        source.kind() == io::ErrorKind::NotFound
    }
}

/// Object store rooted at a single directory
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: Arc<PathBuf>,
}

impl ObjectStore {
    /// Create a store for `root` without touching the filesystem
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = resolver::absolute_root(root.as_ref())?;
        Ok(Self { root: Arc::new(root) })
    }

    /// Create a store and make sure its root directory exists
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let store = Self::new(root)?;
        fs::create_dir_all(store.root())
            .await
            .map_err(|e| Error::StorageRoot {
                path: store.root().display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(store)
    }

    /// Absolute storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object reference to its file path under the root
    pub fn resolve(&self, object: &ObjectRef) -> std::result::Result<PathBuf, PathError> {
        resolver::resolve(&self.root, &object.bucket, &object.key)
    }

    /// Stream `body` into the file at `path`, replacing any previous content.
    ///
    /// Parent directories are created as needed. A failed write leaves the
    /// partially written file in place. Returns the number of bytes stored.
    pub async fn put<S, B, E>(&self, path: &Path, body: S) -> std::result::Result<u64, StoreError>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: Buf + Unpin,
        E: Into<io::Error>,
    {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let file = File::create(path)
            .await
            .map_err(|source| StoreError::CreateFile {
                path: path.to_path_buf(),
                source,
            })?;

        let write_err = |source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = StreamReader::new(body);
        let mut writer = BufWriter::with_capacity(UPLOAD_BUFFER_SIZE, file);
        let written = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(write_err)?;
        writer.flush().await.map_err(write_err)?;

        Ok(written)
    }

    /// Open the file at `path` as a chunked byte stream
    pub async fn get(&self, path: &Path) -> std::result::Result<ReaderStream<File>, StoreError> {
        let open_err = |source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).await.map_err(open_err)?;
        // Directories open fine on unix but are not objects
        let metadata = file.metadata().await.map_err(open_err)?;
        if metadata.is_dir() {
            return Err(open_err(io::Error::new(
                io::ErrorKind::NotFound,
                "path is a directory",
            )));
        }
        Ok(ReaderStream::new(file))
    }

    /// Remove the file at `path`.
    ///
    /// Returns `false` when there was nothing to remove.
    pub async fn delete(&self, path: &Path) -> std::result::Result<bool, StoreError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Remove {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
