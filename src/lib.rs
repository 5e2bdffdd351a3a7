//! s3fs - Filesystem-backed Object Storage
//!
//! A small S3-style object server that maps `(bucket, key)` pairs onto files
//! below a single storage root.
//!
//! # Architecture
//!
//! - [`storage`] resolves object references to paths under the root, refusing
//!   any key that would escape it, and performs the file operations.
//! - [`api`] exposes `PUT`, `GET` and `DELETE` on `/{bucket}/{key...}` and maps
//!   outcomes to HTTP status codes.
//!
//! The filesystem is the system of record. There is no index, cache or
//! locking: concurrent writes to the same key race and the last one wins.

pub mod config;
pub mod error;
pub mod storage;
pub mod api;

pub use config::S3fsConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::HttpServer;
    pub use crate::config::S3fsConfig;
    pub use crate::error::{Error, Result};
    pub use crate::storage::{ObjectRef, ObjectStore, PathError};
}
