//! Object store trait and shared request/response types.
//!
//! The [`ObjectStore`] trait is the whole remote surface the publisher
//! needs: list, put, batch delete, and copy-in-place. Everything above this
//! layer (lister, diff, transfer, hooks) is store-agnostic.
//!
//! A store value is a *bucket handle*: it is bound to one bucket at
//! construction, and every key it receives is the full object key.
//!
//! Implementations:
//! - [`S3Store`](super::s3::S3Store): the AWS SDK against S3 or any
//!   S3-compatible endpoint.
//! - [`MemoryStore`](super::memory::MemoryStore): in-process bucket used by
//!   the test suite.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store request failed: {0}")]
    Request(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// One object as reported by a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    /// ETag exactly as the store returned it (possibly quoted).
    pub etag: String,
    pub size: u64,
}

/// A single page of a paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    /// Token for the next page; `None` once the listing is exhausted.
    pub next_token: Option<String>,
}

/// A PUT of one object with its HTTP metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
    /// Canned ACL, e.g. `public-read`.
    pub acl: Option<String>,
}

/// Copy an object onto itself, replacing its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub key: String,
    pub content_type: Option<String>,
    pub website_redirect: Option<String>,
    pub acl: Option<String>,
}

/// A key the store refused to delete during a batch delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub key: String,
    pub message: String,
}

/// Remote object store operations used by the publisher.
///
/// Implementations must be safe to call from many transfer workers at once.
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this handle is bound to (for logs and reports).
    fn bucket(&self) -> &str;

    /// Fetch one listing page of at most `max_keys` objects.
    fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError>;

    /// Upload one object.
    fn put_object(&self, request: PutRequest) -> Result<(), StoreError>;

    /// Delete a batch of keys in one call.
    ///
    /// An `Err` means the whole call failed. On `Ok`, the returned list holds
    /// the keys the store rejected individually; every other key was deleted.
    fn delete_objects(&self, keys: &[String]) -> Result<Vec<DeleteFailure>, StoreError>;

    /// Copy an object onto itself with replaced metadata.
    fn copy_object(&self, request: CopyRequest) -> Result<(), StoreError>;
}
