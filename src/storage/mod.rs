//! Object Storage Module
//!
//! Path resolution and the filesystem-backed object store.

mod object;
mod resolver;

pub use object::{ObjectRef, ObjectRefError, ObjectStore, StoreError};
pub use resolver::{absolute_root, resolve, PathError};
