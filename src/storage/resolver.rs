//! Object Path Resolution
//!
//! Maps a (bucket, key) pair onto a path below the storage root. Resolution is
//! purely lexical: `.` and `..` segments are collapsed without consulting the
//! filesystem, and the result must stay inside the root.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Path resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The resolved path would land outside the storage root
    #[error("invalid path: path traversal detected for {bucket}/{key}")]
    Traversal { bucket: String, key: String },

    /// The storage root itself has no usable absolute form
    #[error("cannot resolve storage root {root:?}: {reason}")]
    Resolution { root: PathBuf, reason: String },
}

/// Resolve `root/bucket/key` into an absolute, normalized path under `root`.
///
/// The containment check works on whole path components, so `/data/b2` is
/// never mistaken for a child of `/data/b` and `/root2` never passes for
/// `/root`. A target equal to the root itself is accepted.
pub fn resolve(root: &Path, bucket: &str, key: &str) -> Result<PathBuf, PathError> {
    let abs_root = absolute_root(root)?;
    // Leading separators must not turn a segment into an absolute path
    let bucket_rel = bucket.trim_start_matches('/');
    let key_rel = key.trim_start_matches('/');
    let target = normalize(&abs_root.join(bucket_rel).join(key_rel));

    if target == abs_root || target.starts_with(&abs_root) {
        Ok(target)
    } else {
        Err(PathError::Traversal {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

/// Absolute, normalized form of the storage root.
///
/// Relative roots are anchored at the current working directory.
pub fn absolute_root(root: &Path) -> Result<PathBuf, PathError> {
    if root.as_os_str().is_empty() {
        return Err(PathError::Resolution {
            root: root.to_path_buf(),
            reason: "path is empty".to_string(),
        });
    }

    let joined = if root.is_absolute() {
        root.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|e| PathError::Resolution {
            root: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        cwd.join(root)
    };

    Ok(normalize(&joined))
}

/// Lexically collapse `.`, `..` and repeated separators.
///
/// `..` at the filesystem root stays at the root, matching how the kernel
/// treats `/..`.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // pop() refuses to remove the root, which is what we want
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
