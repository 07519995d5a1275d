//! Remote bucket listing.
//!
//! Pages through the bucket listing (following continuation tokens until
//! the store reports no more pages) and builds a [`RemoteIndex`] keyed by
//! the same relative keys the build directory uses.
//!
//! The listing is all-or-nothing: if any page fails, no index is returned.
//! Acting on a partial index would turn every unlisted object into a false
//! deletion.

use crate::digest;
use crate::store::{ObjectStore, StoreError};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ListError {
    #[error("Listing page {page} of bucket {bucket} failed: {source}")]
    Page {
        page: usize,
        bucket: String,
        #[source]
        source: StoreError,
    },
    #[error("Listing of bucket {bucket} repeated continuation token {token:?}")]
    RepeatedToken { bucket: String, token: String },
}

/// Key prefix objects are published under.
///
/// Normalized to either empty or `segment(/segment)*/`, so joining never
/// produces `//` or a leading `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    pub fn new(prefix: &str) -> Self {
        let trimmed = prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            Self(String::new())
        } else {
            Self(format!("{trimmed}/"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Full object key for a relative key.
    pub fn join(&self, key: &str) -> String {
        format!("{}{}", self.0, key)
    }

    /// Relative key for a full object key, if it lies under the prefix.
    pub fn strip<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.0.as_str())
    }
}

/// Snapshot of one remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    /// Relative key (prefix stripped).
    pub key: String,
    /// ETag with surrounding quotes removed.
    pub etag: String,
    pub size: u64,
}

/// Remote objects keyed by relative key.
///
/// Built once per run. The diff removes entries as it matches them against
/// local files, so whatever is left afterwards has no local counterpart.
#[derive(Debug, Clone, Default)]
pub struct RemoteIndex {
    objects: HashMap<String, RemoteObject>,
}

impl RemoteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: RemoteObject) {
        self.objects.insert(object.key.clone(), object);
    }

    pub fn get(&self, key: &str) -> Option<&RemoteObject> {
        self.objects.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<RemoteObject> {
        self.objects.remove(key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.objects.values().map(|o| o.size).sum()
    }

    /// Consume the index, returning its keys in sorted order.
    pub fn into_keys(self) -> BTreeSet<String> {
        self.objects.into_keys().collect()
    }
}

impl FromIterator<RemoteObject> for RemoteIndex {
    fn from_iter<I: IntoIterator<Item = RemoteObject>>(iter: I) -> Self {
        let mut index = Self::new();
        for object in iter {
            index.insert(object);
        }
        index
    }
}

/// List every object under `prefix` into a [`RemoteIndex`].
///
/// Issues `ceil(objects / page_size)` list calls (one for an empty bucket).
pub fn list_remote(
    store: &dyn ObjectStore,
    prefix: &KeyPrefix,
    page_size: usize,
) -> Result<RemoteIndex, ListError> {
    let mut index = RemoteIndex::new();
    let mut seen_tokens = HashSet::new();
    let mut token: Option<String> = None;
    let mut page = 0;
    let list_prefix = (!prefix.is_empty()).then(|| prefix.as_str());

    loop {
        let listing = store
            .list_objects(list_prefix, token.as_deref(), page_size)
            .map_err(|source| ListError::Page {
                page,
                bucket: store.bucket().to_string(),
                source,
            })?;
        page += 1;
        debug!(page, objects = listing.objects.len(), "listed page");

        for listed in listing.objects {
            let Some(relative) = prefix.strip(&listed.key) else {
                continue;
            };
            // The prefix's own folder marker.
            if relative.is_empty() {
                continue;
            }
            index.insert(RemoteObject {
                key: relative.to_string(),
                etag: digest::normalize_etag(&listed.etag).to_string(),
                size: listed.size,
            });
        }

        match listing.next_token {
            Some(next) => {
                if !seen_tokens.insert(next.clone()) {
                    return Err(ListError::RepeatedToken {
                        bucket: store.bucket().to_string(),
                        token: next,
                    });
                }
                token = Some(next);
            }
            None => break,
        }
    }

    info!(
        bucket = store.bucket(),
        objects = index.len(),
        pages = page,
        "listed remote objects"
    );
    Ok(index)
}
