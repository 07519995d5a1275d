//! Remote object stores.
//!
//! - **Backend**: the [`ObjectStore`] trait and its request/response types
//! - **S3**: [`S3Store`], the production implementation
//! - **Memory**: [`MemoryStore`], an in-process bucket for tests

pub mod backend;
pub mod memory;
pub mod s3;

pub use backend::{
    CopyRequest, DeleteFailure, ListPage, ListedObject, ObjectStore, PutRequest, StoreError,
};
pub use memory::MemoryStore;
pub use s3::S3Store;
