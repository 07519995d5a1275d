//! Shared test utilities for the bakery test suite.
//!
//! Provides build-tree fixtures and bucket seeding helpers so module tests
//! can set up "local build + remote bucket" scenarios in a couple of lines.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let build = build_tree(&[("index.html", "X"), ("css/site.css", "body{}")]);
//! let store = bucket_with(&[("index.html", "X"), ("stale.txt", "old")]);
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::config::PublishConfig;
use crate::remote::{self, KeyPrefix, RemoteIndex};
use crate::scan::{self, LocalFile};
use crate::store::MemoryStore;

// =========================================================================
// Fixture setup
// =========================================================================

/// Write `(relative path, contents)` pairs beneath `root`, creating parents.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
    }
}

/// A fresh temp build directory holding `files`.
pub fn build_tree(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    write_tree(tmp.path(), files);
    tmp
}

/// A memory bucket named `test-bucket` holding `objects`.
pub fn bucket_with(objects: &[(&str, &str)]) -> MemoryStore {
    let store = MemoryStore::new("test-bucket");
    for (key, body) in objects {
        store.insert(*key, body.as_bytes());
    }
    store
}

/// Default config pointed at `build` and the `test-bucket` bucket.
pub fn test_config(build: &Path) -> PublishConfig {
    let mut config = PublishConfig::default();
    config.build_dir = build.to_string_lossy().to_string();
    config.bucket.name = "test-bucket".to_string();
    config
}

// =========================================================================
// Shortcuts through the enumerate/list phases
// =========================================================================

pub fn local_files(build: &TempDir) -> Vec<LocalFile> {
    scan::scan(build.path()).unwrap()
}

pub fn remote_index(store: &MemoryStore) -> RemoteIndex {
    remote::list_remote(store, &KeyPrefix::default(), 1000).unwrap()
}

/// Sorted keys, for order-independent comparisons.
pub fn sorted<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut keys: Vec<&str> = keys.into_iter().collect();
    keys.sort_unstable();
    keys
}
