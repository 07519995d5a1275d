//! The publish run, end to end.
//!
//! A run is a straight line with no back-edges:
//!
//! ```text
//! enumerate local → list remote → diff → transfer → hooks → report
//! ```
//!
//! The mode flags are threaded through rather than forming separate paths:
//!
//! - `force`: every local file is uploaded, digests are not compared.
//! - `dry_run`: no remote mutation at all; counts show what would happen.
//! - `no_delete`: remote-only objects are left alone. Combined with `force`
//!   no decision depends on remote state, so the listing is skipped.
//! - `no_pooling`: transfers run serially on the calling thread.
//!
//! Fatal errors (bad config, missing build directory, failed listing)
//! abort the run before anything is written. Everything after the diff
//! fails per item: failures are collected into the [`PublishReport`] and
//! the run carries on.
//!
//! [`Publisher::unpublish`] is the inverse: it lists everything under the
//! prefix and deletes it with the same chunking and dry-run behavior.

use crate::config::{self, ConfigError, PublishConfig};
use crate::hooks::{HookContext, HookRegistry};
use crate::metadata::MetadataResolver;
use crate::plan::{self, DiffOptions, SyncPlan};
use crate::remote::{self, KeyPrefix, ListError};
use crate::scan::{self, LocalFile, ScanError};
use crate::store::ObjectStore;
use crate::transfer::{self, Executor, Failure, Phase, TransferSettings};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    List(#[from] ListError),
    #[error("Failed to start transfer pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Orthogonal run flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishModes {
    pub force: bool,
    pub dry_run: bool,
    pub no_delete: bool,
    pub no_pooling: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Publish,
    Unpublish,
}

/// Everything a run did, or would have done in a dry run.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub kind: RunKind,
    pub bucket: String,
    pub prefix: String,
    pub modes: PublishModes,
    pub local_files: usize,
    pub local_bytes: u64,
    /// Objects found under the prefix; `None` when listing was skipped.
    pub remote_objects: Option<usize>,
    pub plan: SyncPlan,
    pub uploaded: usize,
    pub deleted: usize,
    /// Hooks run, or that would have run in a dry run.
    pub hooks_run: usize,
    pub failures: Vec<Failure>,
    pub elapsed_ms: u64,
}

impl PublishReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failures_in(&self, phase: Phase) -> usize {
        self.failures.iter().filter(|f| f.phase == phase).count()
    }

    /// Whether the bucket was left untouched.
    pub fn changed_nothing(&self) -> bool {
        self.modes.dry_run || (self.uploaded == 0 && self.deleted == 0 && self.hooks_run == 0)
    }
}

/// Runs publish and unpublish against one store.
pub struct Publisher<'a> {
    config: &'a PublishConfig,
    modes: PublishModes,
    store: &'a dyn ObjectStore,
    hooks: &'a HookRegistry,
}

impl<'a> Publisher<'a> {
    pub fn new(
        config: &'a PublishConfig,
        modes: PublishModes,
        store: &'a dyn ObjectStore,
        hooks: &'a HookRegistry,
    ) -> Self {
        Self {
            config,
            modes,
            store,
            hooks,
        }
    }

    fn prefix(&self) -> KeyPrefix {
        KeyPrefix::new(&self.config.bucket.prefix)
    }

    fn executor(&self) -> Result<Executor, PublishError> {
        let threads = config::effective_threads(&self.config.processing);
        Ok(Executor::new(threads, self.modes.no_pooling)?)
    }

    /// Sync the build directory to the bucket.
    pub fn publish(&self) -> Result<PublishReport, PublishError> {
        let started = Instant::now();
        self.config.validate()?;
        let prefix = self.prefix();

        let build_dir = Path::new(&self.config.build_dir);
        let local = scan::scan(build_dir)?;
        let local_bytes: u64 = local.iter().map(|f| f.size).sum();
        info!(
            build_dir = %build_dir.display(),
            files = local.len(),
            bytes = local_bytes,
            "enumerated build directory"
        );

        let remote = if self.modes.force && self.modes.no_delete {
            info!("force without delete: skipping remote listing");
            None
        } else {
            Some(remote::list_remote(
                self.store,
                &prefix,
                self.config.publish.list_page_size,
            )?)
        };
        let remote_objects = remote.as_ref().map(|index| index.len());

        let plan = plan::plan_sync(
            &local,
            remote.unwrap_or_default(),
            &DiffOptions {
                force: self.modes.force,
                no_delete: self.modes.no_delete,
                multipart_chunk_size: self.config.publish.multipart_chunk_size,
            },
        );
        info!(
            uploads = plan.uploads.len(),
            deletions = plan.deletions.len(),
            unchanged = plan.unchanged,
            "planned sync"
        );

        let executor = self.executor()?;
        let resolver = MetadataResolver::new(&self.config.publish);
        let settings = TransferSettings {
            prefix: &prefix,
            resolver: &resolver,
            acl: self.config.bucket.canned_acl(),
            delete_chunk_size: self.config.publish.delete_chunk_size,
            dry_run: self.modes.dry_run,
        };
        let mut transfer = transfer::execute(self.store, &plan, &settings, &executor);

        let failed_uploads: BTreeSet<String> = transfer
            .failed_uploads()
            .into_iter()
            .map(str::to_string)
            .collect();
        let (hooks_run, hook_failures) = self.run_hooks(&local, &failed_uploads, &prefix);
        transfer.failures.extend(hook_failures);

        let report = PublishReport {
            kind: RunKind::Publish,
            bucket: self.store.bucket().to_string(),
            prefix: prefix.as_str().to_string(),
            modes: self.modes,
            local_files: local.len(),
            local_bytes,
            remote_objects,
            plan,
            uploaded: transfer.uploaded,
            deleted: transfer.deleted,
            hooks_run,
            failures: transfer.failures,
            elapsed_ms: elapsed_ms(started),
        };
        info!(
            uploaded = report.uploaded,
            deleted = report.deleted,
            hooks = report.hooks_run,
            failures = report.failures.len(),
            elapsed_ms = report.elapsed_ms,
            "publish finished"
        );
        Ok(report)
    }

    /// Run every registered hook for each local key whose upload did not
    /// fail. Returns the number run and the failures.
    fn run_hooks(
        &self,
        local: &[LocalFile],
        failed_uploads: &BTreeSet<String>,
        prefix: &KeyPrefix,
    ) -> (usize, Vec<Failure>) {
        let mut run = 0;
        let mut failures = Vec::new();
        if self.hooks.is_empty() {
            return (run, failures);
        }

        for file in local {
            if failed_uploads.contains(&file.key) {
                continue;
            }
            let object_key = prefix.join(&file.key);
            for hook in self.hooks.matching(&file.key) {
                if self.modes.dry_run {
                    debug!(key = %file.key, hook = hook.name(), "would run hook");
                    run += 1;
                    continue;
                }
                let ctx = HookContext {
                    store: self.store,
                    key: &file.key,
                    object_key: &object_key,
                    build_path: &file.path,
                    acl: self.config.bucket.canned_acl(),
                };
                match hook.post_publish(&ctx) {
                    Ok(()) => {
                        debug!(key = %file.key, hook = hook.name(), "ran hook");
                        run += 1;
                    }
                    Err(e) => {
                        warn!(key = %file.key, hook = hook.name(), error = %e, "hook failed");
                        failures.push(Failure {
                            phase: Phase::Hook,
                            key: file.key.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
        (run, failures)
    }

    /// Delete every object under the prefix.
    pub fn unpublish(&self) -> Result<PublishReport, PublishError> {
        let started = Instant::now();
        self.config.validate()?;
        let prefix = self.prefix();

        let index = remote::list_remote(self.store, &prefix, self.config.publish.list_page_size)?;
        let remote_objects = index.len();
        let plan = SyncPlan {
            deletions: index.into_keys(),
            ..SyncPlan::default()
        };

        let resolver = MetadataResolver::new(&self.config.publish);
        let settings = TransferSettings {
            prefix: &prefix,
            resolver: &resolver,
            acl: None,
            delete_chunk_size: self.config.publish.delete_chunk_size,
            dry_run: self.modes.dry_run,
        };
        let deletes = transfer::delete_all(self.store, &plan.deletions, &settings);

        let report = PublishReport {
            kind: RunKind::Unpublish,
            bucket: self.store.bucket().to_string(),
            prefix: prefix.as_str().to_string(),
            modes: self.modes,
            local_files: 0,
            local_bytes: 0,
            remote_objects: Some(remote_objects),
            plan,
            uploaded: 0,
            deleted: deletes.deleted,
            hooks_run: 0,
            failures: deletes.failures,
            elapsed_ms: elapsed_ms(started),
        };
        info!(
            deleted = report.deleted,
            failures = report.failures.len(),
            "unpublish finished"
        );
        Ok(report)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
