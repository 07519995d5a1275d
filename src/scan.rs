//! Build directory enumeration.
//!
//! Walks the build directory and yields one [`LocalFile`] per regular file,
//! keyed by its path relative to the root:
//!
//! ```text
//! build/                       keys
//! ├── index.html           →   index.html
//! ├── css/
//! │   └── site.css         →   css/site.css
//! └── 2024/05/
//!     └── index.html       →   2024/05/index.html
//! ```
//!
//! Keys always use `/` separators and never start with `./`, whatever the
//! host platform. Directories are not emitted. Symlinked directories are not
//! descended into; a symlink to a regular file is published as that file.
//! A dangling symlink is skipped with a warning.
//!
//! A missing root is an error: there is nothing to publish without a build.

use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Build directory does not exist: {0}. Cannot publish something before you build it.")]
    RootNotFound(PathBuf),
    #[error("Build path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Path is not valid UTF-8 and cannot be used as an object key: {0}")]
    NonUtf8Path(PathBuf),
    #[error("Path is not inside the build directory: {0}")]
    NotUnderRoot(PathBuf),
}

/// A file in the build directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalFile {
    /// Relative key, `/`-separated, e.g. `css/site.css`.
    pub key: String,
    /// Absolute (or root-joined) path to read the file from.
    pub path: PathBuf,
    /// Size in bytes at enumeration time.
    pub size: u64,
}

/// Lazily walk `root`, yielding every regular file beneath it in
/// file-name order.
///
/// Fails up front if `root` is missing or not a directory; per-entry errors
/// are yielded in-stream.
pub fn walk(root: &Path) -> Result<impl Iterator<Item = Result<LocalFile, ScanError>>, ScanError> {
    if !root.exists() {
        return Err(ScanError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let root = root.to_path_buf();
    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    Ok(walker.filter_map(move |entry| {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => return Some(Err(ScanError::Walk(e))),
        };
        let file_type = entry.file_type();
        let size = if file_type.is_file() {
            match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => return Some(Err(ScanError::Walk(e))),
            }
        } else if file_type.is_symlink() {
            // Follow file symlinks for their content, never for traversal.
            match std::fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => meta.len(),
                Ok(_) => return None,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "skipping dangling symlink");
                    return None;
                }
            }
        } else {
            return None;
        };

        Some(relative_key(&root, entry.path()).map(|key| LocalFile {
            key,
            path: entry.path().to_path_buf(),
            size,
        }))
    }))
}

/// Enumerate the whole build directory.
pub fn scan(root: &Path) -> Result<Vec<LocalFile>, ScanError> {
    walk(root)?.collect()
}

/// Turn `path` (beneath `root`) into a `/`-separated object key.
pub fn relative_key(root: &Path, path: &Path) -> Result<String, ScanError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| ScanError::NotUnderRoot(path.to_path_buf()))?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(
                segment
                    .to_str()
                    .ok_or_else(|| ScanError::NonUtf8Path(path.to_path_buf()))?,
            ),
            Component::CurDir => {}
            _ => return Err(ScanError::NotUnderRoot(path.to_path_buf())),
        }
    }
    Ok(segments.join("/"))
}
