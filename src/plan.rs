//! Diffing the build directory against the bucket.
//!
//! One sequential pass over the local files decides, per file, whether it
//! must be uploaded. Matched keys are removed from the [`RemoteIndex`] as
//! the pass goes, so once it finishes the index holds exactly the remote
//! objects with no local counterpart: the deletion candidates.
//!
//! | Local file | Remote object | `force` | Decision |
//! |---|---|---|---|
//! | present | absent | any | upload (`new`) |
//! | present | same fingerprint | off | nothing |
//! | present | different fingerprint | off | upload (`changed`) |
//! | present | any | on | upload (`forced`) |
//! | absent | present | any | delete, unless `no_delete` |
//!
//! Fingerprints are compared with [`digest::matches_remote`], which picks
//! whole-file or multipart hashing from the shape of the remote ETag.
//! Modification times are never consulted.
//!
//! The pass is deliberately single-threaded: it is the only code that
//! mutates the index. It produces an immutable [`SyncPlan`], and only the
//! transfer of that plan runs in parallel.

use crate::digest;
use crate::remote::RemoteIndex;
use crate::scan::LocalFile;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Why a file is in the upload set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadReason {
    /// Not in the bucket yet.
    New,
    /// In the bucket with different content.
    Changed,
    /// Uploaded regardless of content because of `--force`.
    Forced,
}

impl UploadReason {
    /// Verb used in verbose listings.
    pub fn verb(self) -> &'static str {
        match self {
            UploadReason::New => "creating",
            UploadReason::Changed => "updating",
            UploadReason::Forced => "forcing update of",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpload {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    pub reason: UploadReason,
}

/// Everything a run will change in the bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub uploads: Vec<PlannedUpload>,
    /// Relative keys to delete, sorted.
    pub deletions: BTreeSet<String>,
    /// Local files already up to date remotely.
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.deletions.is_empty()
    }

    pub fn upload_bytes(&self) -> u64 {
        self.uploads.iter().map(|u| u.size).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiffOptions {
    /// Upload every local file without comparing fingerprints.
    pub force: bool,
    /// Never delete remote-only objects.
    pub no_delete: bool,
    /// Part size assumed for multipart ETags.
    pub multipart_chunk_size: u64,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            force: false,
            no_delete: false,
            multipart_chunk_size: digest::MULTIPART_CHUNK_SIZE,
        }
    }
}

/// Decide the upload set, removing every matched key from `remote`.
///
/// On return `remote` contains only objects with no local counterpart.
pub fn diff(
    local: &[LocalFile],
    remote: &mut RemoteIndex,
    options: &DiffOptions,
) -> (Vec<PlannedUpload>, usize) {
    let mut uploads = Vec::new();
    let mut unchanged = 0;

    for file in local {
        let reason = match remote.remove(&file.key) {
            _ if options.force => Some(UploadReason::Forced),
            None => Some(UploadReason::New),
            Some(object) => {
                match digest::matches_remote(&file.path, &object.etag, options.multipart_chunk_size)
                {
                    Ok(true) => None,
                    Ok(false) => Some(UploadReason::Changed),
                    Err(e) => {
                        // The upload will hit the same error and report it.
                        warn!(key = %file.key, error = %e, "cannot fingerprint local file");
                        Some(UploadReason::Changed)
                    }
                }
            }
        };

        match reason {
            Some(reason) => {
                debug!(key = %file.key, "{} file", reason.verb());
                uploads.push(PlannedUpload {
                    key: file.key.clone(),
                    path: file.path.clone(),
                    size: file.size,
                    reason,
                });
            }
            None => {
                debug!(key = %file.key, "unchanged");
                unchanged += 1;
            }
        }
    }

    (uploads, unchanged)
}

/// Build the full plan for one run.
///
/// Consumes `remote`: whatever survives [`diff`] becomes the deletion set,
/// or is dropped unused under `no_delete`.
pub fn plan_sync(local: &[LocalFile], mut remote: RemoteIndex, options: &DiffOptions) -> SyncPlan {
    let (uploads, unchanged) = diff(local, &mut remote, options);
    let deletions = if options.no_delete {
        BTreeSet::new()
    } else {
        remote.into_keys()
    };
    for key in &deletions {
        debug!(key = %key, "deleting file");
    }

    SyncPlan {
        uploads,
        deletions,
        unchanged,
    }
}
