//! # Bakery
//!
//! Publishes a built static site to an S3-compatible bucket, transferring
//! only what changed. The build directory is the source of truth: after a
//! run the bucket (under the configured prefix) holds exactly the build
//! directory's files, byte for byte.
//!
//! # Architecture: One Linear Run
//!
//! ```text
//! 1. Enumerate   build/   →  Vec<LocalFile>   (walk the build directory)
//! 2. List        bucket   →  RemoteIndex      (paged listing, ETags)
//! 3. Diff        both     →  SyncPlan         (digest comparison)
//! 4. Transfer    plan     →  TransferReport   (parallel PUTs, batch deletes)
//! 5. Hooks       keys     →  post-publish     (e.g. website redirects)
//! ```
//!
//! Each phase is a plain function over the previous phase's output, so
//! tests drive any of them against an in-memory bucket without touching
//! the network.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Walks the build directory into relative-keyed [`scan::LocalFile`]s |
//! | [`remote`] | Paged bucket listing into a [`remote::RemoteIndex`] |
//! | [`digest`] | MD5 and multipart fingerprints comparable to S3 ETags |
//! | [`plan`] | Single-pass diff producing an immutable [`plan::SyncPlan`] |
//! | [`metadata`] | Content-Type, Content-Encoding and Cache-Control per object |
//! | [`transfer`] | Worker-pool uploads and chunked batch deletes |
//! | [`hooks`] | Post-publish hook trait, pattern registry, redirect hook |
//! | [`publish`] | The run itself: [`publish::Publisher`] and its report |
//! | [`store`] | The [`store::ObjectStore`] trait, an S3 client, an in-memory store |
//! | [`config`] | `bakery.toml` loading, layering and validation |
//! | [`output`] | CLI summary formatting |
//!
//! # Design Decisions
//!
//! ## Content Digests, Never Timestamps
//!
//! A file is unchanged exactly when its digest equals the remote ETag.
//! Rebuilds rewrite every file and reset every mtime, so timestamps would
//! reupload the whole site on each run. For objects uploaded in parts the
//! ETag is a digest of part digests; [`digest`] reproduces that shape so
//! large files are not reuploaded forever.
//!
//! ## All-or-Nothing Listing
//!
//! A failed listing page aborts the run. A partial index would make every
//! unlisted object look remote-only and delete it.
//!
//! ## Sequential Diff, Parallel Transfer
//!
//! The diff is the only code that mutates the remote index and runs on one
//! thread. Its output is immutable, and each upload and delete chunk is
//! independent, so the transfer phase fans out on a rayon pool with no
//! shared mutable state.
//!
//! ## Failures Are Data
//!
//! Once the plan exists, nothing aborts the run. A failed PUT, delete chunk
//! or hook becomes a [`transfer::Failure`] in the report and the CLI exits
//! with status 2. Rerunning is always safe: the next run re-diffs.
//!
//! ## A Blocking Store Trait
//!
//! [`store::ObjectStore`] is synchronous. The S3 implementation owns a
//! tokio runtime and blocks on each SDK call, which keeps the worker pool
//! plain OS threads and lets tests substitute [`store::MemoryStore`].

pub mod config;
pub mod digest;
pub mod hooks;
pub mod metadata;
pub mod output;
pub mod plan;
pub mod publish;
pub mod remote;
pub mod scan;
pub mod store;
pub mod transfer;

#[cfg(test)]
pub(crate) mod test_helpers;
