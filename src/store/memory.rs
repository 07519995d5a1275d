//! In-process object store.
//!
//! Behaves like a small S3 bucket: objects are kept in key order, listings
//! are paginated with opaque continuation tokens, ETags are the quoted MD5
//! of the body, and batch deletes report per-key failures. Every call is
//! recorded so tests can assert on exactly what a run did to the bucket.
//!
//! Failures can be injected per key (uploads, deletes) or per listing page.
//! Uses a `Mutex` (not `RefCell`) so it is `Sync` and works with rayon.

use super::backend::{
    CopyRequest, DeleteFailure, ListPage, ListedObject, ObjectStore, PutRequest, StoreError,
};
use md5::{Digest, Md5};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// An object held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub etag: String,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
    pub acl: Option<String>,
    pub website_redirect: Option<String>,
}

impl StoredObject {
    fn from_body(body: Vec<u8>) -> Self {
        let etag = format!("\"{}\"", hex::encode(Md5::digest(&body)));
        Self {
            body,
            etag,
            content_type: None,
            content_encoding: None,
            cache_control: None,
            acl: None,
            website_redirect: None,
        }
    }
}

/// A call made against the store, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOp {
    List {
        prefix: Option<String>,
        token: Option<String>,
    },
    Put(String),
    DeleteBatch(Vec<String>),
    Copy(String),
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    operations: Vec<RecordedOp>,
    failing_puts: HashSet<String>,
    failing_delete_calls: HashSet<String>,
    rejected_deletes: HashSet<String>,
    failing_list_page: Option<usize>,
    list_pages_served: usize,
}

#[derive(Debug)]
pub struct MemoryStore {
    bucket: String,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store an object directly, bypassing the call log.
    pub fn insert(&self, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.state()
            .objects
            .insert(key.into(), StoredObject::from_body(body.into()));
    }

    /// Store an object with an explicit ETag, e.g. one that a multipart
    /// upload would have produced.
    pub fn insert_with_etag(
        &self,
        key: impl Into<String>,
        body: impl Into<Vec<u8>>,
        etag: impl Into<String>,
    ) {
        let mut object = StoredObject::from_body(body.into());
        object.etag = etag.into();
        self.state().objects.insert(key.into(), object);
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.state().objects.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state().objects.contains_key(key)
    }

    /// All keys currently in the bucket, in key order.
    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    pub fn operations(&self) -> Vec<RecordedOp> {
        self.state().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    /// Keys of every object uploaded so far, in call order.
    pub fn put_keys(&self) -> Vec<String> {
        self.state()
            .operations
            .iter()
            .filter_map(|op| match op {
                RecordedOp::Put(key) => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every batch-delete call so far, in call order.
    pub fn delete_batches(&self) -> Vec<Vec<String>> {
        self.state()
            .operations
            .iter()
            .filter_map(|op| match op {
                RecordedOp::DeleteBatch(keys) => Some(keys.clone()),
                _ => None,
            })
            .collect()
    }

    /// Make every PUT of `key` fail.
    pub fn fail_put(&self, key: impl Into<String>) {
        self.state().failing_puts.insert(key.into());
    }

    /// Make any batch-delete call that includes `key` fail as a whole.
    pub fn fail_delete_call_containing(&self, key: impl Into<String>) {
        self.state().failing_delete_calls.insert(key.into());
    }

    /// Make the store refuse to delete `key` while deleting the rest of its batch.
    pub fn reject_delete(&self, key: impl Into<String>) {
        self.state().rejected_deletes.insert(key.into());
    }

    /// Fail the `page`-th listing call (zero-based).
    pub fn fail_list_page(&self, page: usize) {
        self.state().failing_list_page = Some(page);
    }
}

impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError> {
        let mut state = self.state();
        state.operations.push(RecordedOp::List {
            prefix: prefix.map(String::from),
            token: continuation_token.map(String::from),
        });

        let page_index = state.list_pages_served;
        state.list_pages_served += 1;
        if state.failing_list_page == Some(page_index) {
            return Err(StoreError::Request(format!(
                "listing page {page_index} unavailable"
            )));
        }
        if max_keys == 0 {
            return Err(StoreError::InvalidRequest("max_keys must be positive".into()));
        }

        // The token is the last key of the previous page.
        let mut matching = state
            .objects
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .filter(|(key, _)| continuation_token.is_none_or(|t| key.as_str() > t));

        let objects: Vec<ListedObject> = matching
            .by_ref()
            .take(max_keys)
            .map(|(key, object)| ListedObject {
                key: key.clone(),
                etag: object.etag.clone(),
                size: object.body.len() as u64,
            })
            .collect();

        let next_token = match (matching.next(), objects.last()) {
            (Some(_), Some(last)) => Some(last.key.clone()),
            _ => None,
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    fn put_object(&self, request: PutRequest) -> Result<(), StoreError> {
        let mut state = self.state();
        state.operations.push(RecordedOp::Put(request.key.clone()));
        if state.failing_puts.contains(&request.key) {
            return Err(StoreError::Request(format!(
                "PUT {} rejected",
                request.key
            )));
        }

        let mut object = StoredObject::from_body(request.body);
        object.content_type = request.content_type;
        object.content_encoding = request.content_encoding;
        object.cache_control = request.cache_control;
        object.acl = request.acl;
        state.objects.insert(request.key, object);
        Ok(())
    }

    fn delete_objects(&self, keys: &[String]) -> Result<Vec<DeleteFailure>, StoreError> {
        let mut state = self.state();
        state.operations.push(RecordedOp::DeleteBatch(keys.to_vec()));
        if keys.iter().any(|k| state.failing_delete_calls.contains(k)) {
            return Err(StoreError::Request("DeleteObjects call failed".into()));
        }

        let mut failures = Vec::new();
        for key in keys {
            if state.rejected_deletes.contains(key) {
                failures.push(DeleteFailure {
                    key: key.clone(),
                    message: "AccessDenied".into(),
                });
            } else {
                state.objects.remove(key);
            }
        }
        Ok(failures)
    }

    fn copy_object(&self, request: CopyRequest) -> Result<(), StoreError> {
        let mut state = self.state();
        state.operations.push(RecordedOp::Copy(request.key.clone()));
        let object = state.objects.get_mut(&request.key).ok_or_else(|| {
            StoreError::Request(format!("copy source {} does not exist", request.key))
        })?;
        // Metadata is replaced, not merged.
        object.content_type = request.content_type;
        object.content_encoding = None;
        object.cache_control = None;
        object.website_redirect = request.website_redirect;
        object.acl = request.acl;
        Ok(())
    }
}
