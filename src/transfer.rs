//! Executing a [`SyncPlan`] against the store.
//!
//! Uploads are independent units dispatched to a fixed-size rayon pool (or
//! run one after another on the calling thread with `--no-pooling`). Each
//! unit reads its file, resolves its headers and issues one PUT. A failing
//! unit is logged and recorded as a [`Failure`]; the others carry on.
//!
//! Deletions are partitioned into chunks of `delete_chunk_size` keys and
//! sent as one batch-delete call per chunk. A failed chunk is recorded and
//! the remaining chunks still go out. Nothing is retried here; retries are
//! the client library's business.
//!
//! In dry-run mode no store call is made at all, but every unit is counted
//! as if it had succeeded so the report shows what a real run would do.

use crate::metadata::MetadataResolver;
use crate::plan::{PlannedUpload, SyncPlan};
use crate::remote::KeyPrefix;
use crate::store::{ObjectStore, PutRequest, StoreError};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Which kind of remote operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Upload,
    Delete,
    Hook,
}

/// One per-item failure. Failures never abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub phase: Phase,
    /// Relative key the failure concerns.
    pub key: String,
    pub message: String,
}

/// Result of one upload unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Uploaded,
    /// Dry run: the PUT was skipped.
    WouldUpload,
    Failed(String),
}

/// Aggregate counts for the transfer phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    /// Uploads completed, or that would have been in a dry run.
    pub uploaded: usize,
    /// Deletions completed, or that would have been in a dry run.
    pub deleted: usize,
    pub failures: Vec<Failure>,
}

impl TransferReport {
    /// Relative keys whose upload failed.
    pub fn failed_uploads(&self) -> BTreeSet<&str> {
        self.failures
            .iter()
            .filter(|f| f.phase == Phase::Upload)
            .map(|f| f.key.as_str())
            .collect()
    }
}

/// Runs independent work units either serially or on a dedicated pool.
pub enum Executor {
    Serial,
    Pool(rayon::ThreadPool),
}

impl Executor {
    /// A pool of `threads` workers, or serial execution when `no_pooling`
    /// is set or only one thread is available.
    pub fn new(threads: usize, no_pooling: bool) -> Result<Self, rayon::ThreadPoolBuildError> {
        if no_pooling || threads <= 1 {
            return Ok(Executor::Serial);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("bakery-transfer-{i}"))
            .build()?;
        Ok(Executor::Pool(pool))
    }

    pub fn threads(&self) -> usize {
        match self {
            Executor::Serial => 1,
            Executor::Pool(pool) => pool.current_num_threads(),
        }
    }

    /// Apply `f` to every item, returning results in input order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match self {
            Executor::Serial => items.iter().map(f).collect(),
            Executor::Pool(pool) => pool.install(|| items.par_iter().map(f).collect()),
        }
    }
}

/// Settings shared by every transfer unit.
pub struct TransferSettings<'a> {
    pub prefix: &'a KeyPrefix,
    pub resolver: &'a MetadataResolver,
    /// Canned ACL applied to every upload.
    pub acl: Option<&'a str>,
    pub delete_chunk_size: usize,
    pub dry_run: bool,
}

/// Upload one planned file.
pub fn upload_one(
    store: &dyn ObjectStore,
    upload: &PlannedUpload,
    settings: &TransferSettings<'_>,
) -> TransferOutcome {
    if settings.dry_run {
        debug!(key = %upload.key, "would upload");
        return TransferOutcome::WouldUpload;
    }
    match put_file(store, upload, settings) {
        Ok(()) => {
            debug!(key = %upload.key, reason = ?upload.reason, "uploaded");
            TransferOutcome::Uploaded
        }
        Err(e) => {
            warn!(key = %upload.key, error = %e, "upload failed");
            TransferOutcome::Failed(e.to_string())
        }
    }
}

fn put_file(
    store: &dyn ObjectStore,
    upload: &PlannedUpload,
    settings: &TransferSettings<'_>,
) -> Result<(), StoreError> {
    let body = std::fs::read(&upload.path)?;
    let head = &body[..body.len().min(2)];
    let metadata = settings.resolver.resolve(&upload.key, head);

    store.put_object(PutRequest {
        key: settings.prefix.join(&upload.key),
        body,
        content_type: metadata.content_type,
        content_encoding: metadata.content_encoding,
        cache_control: metadata.cache_control,
        acl: settings.acl.map(str::to_string),
    })
}

/// Upload every planned file on `executor`.
pub fn upload_all(
    store: &dyn ObjectStore,
    uploads: &[PlannedUpload],
    settings: &TransferSettings<'_>,
    executor: &Executor,
) -> TransferReport {
    info!(
        files = uploads.len(),
        threads = executor.threads(),
        dry_run = settings.dry_run,
        "uploading"
    );
    let outcomes = executor.map(uploads, |upload| upload_one(store, upload, settings));

    let mut report = TransferReport::default();
    for (upload, outcome) in uploads.iter().zip(outcomes) {
        match outcome {
            TransferOutcome::Uploaded | TransferOutcome::WouldUpload => report.uploaded += 1,
            TransferOutcome::Failed(message) => report.failures.push(Failure {
                phase: Phase::Upload,
                key: upload.key.clone(),
                message,
            }),
        }
    }
    report
}

/// Delete `keys` (relative) in chunked batch calls.
pub fn delete_all(
    store: &dyn ObjectStore,
    keys: &BTreeSet<String>,
    settings: &TransferSettings<'_>,
) -> TransferReport {
    let mut report = TransferReport::default();
    if keys.is_empty() {
        return report;
    }
    let keys: Vec<&String> = keys.iter().collect();
    let chunk_size = settings.delete_chunk_size.max(1);
    info!(
        keys = keys.len(),
        chunks = keys.len().div_ceil(chunk_size),
        dry_run = settings.dry_run,
        "deleting"
    );

    for chunk in keys.chunks(chunk_size) {
        if settings.dry_run {
            report.deleted += chunk.len();
            continue;
        }

        let full: Vec<String> = chunk.iter().map(|k| settings.prefix.join(k)).collect();
        match store.delete_objects(&full) {
            Ok(rejected) => {
                report.deleted += chunk.len().saturating_sub(rejected.len());
                for failure in rejected {
                    warn!(key = %failure.key, error = %failure.message, "delete rejected");
                    let key = settings
                        .prefix
                        .strip(&failure.key)
                        .unwrap_or(&failure.key)
                        .to_string();
                    report.failures.push(Failure {
                        phase: Phase::Delete,
                        key,
                        message: failure.message,
                    });
                }
            }
            Err(e) => {
                warn!(keys = chunk.len(), error = %e, "batch delete failed");
                let message = e.to_string();
                report
                    .failures
                    .extend(chunk.iter().map(|key| Failure {
                        phase: Phase::Delete,
                        key: key.to_string(),
                        message: message.clone(),
                    }));
            }
        }
    }
    report
}

/// Upload then delete everything in `plan`.
pub fn execute(
    store: &dyn ObjectStore,
    plan: &SyncPlan,
    settings: &TransferSettings<'_>,
    executor: &Executor,
) -> TransferReport {
    let mut report = upload_all(store, &plan.uploads, settings, executor);
    let deletes = delete_all(store, &plan.deletions, settings);
    report.deleted = deletes.deleted;
    report.failures.extend(deletes.failures);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::plan::{DiffOptions, plan_sync};
    use crate::remote::RemoteIndex;
    use crate::test_helpers::{build_tree, bucket_with, local_files, remote_index};

    fn settings<'a>(
        prefix: &'a KeyPrefix,
        resolver: &'a MetadataResolver,
        dry_run: bool,
    ) -> TransferSettings<'a> {
        TransferSettings {
            prefix,
            resolver,
            acl: Some("public-read"),
            delete_chunk_size: 100,
            dry_run,
        }
    }

    fn keys(n: usize) -> BTreeSet<String> {
        (0..n).map(|i| format!("old/{i:04}.html")).collect()
    }

    #[test]
    fn executor_preserves_order_on_pool() {
        let executor = Executor::new(4, false).unwrap();
        let items: Vec<u32> = (0..100).collect();
        let doubled = executor.map(&items, |n| n * 2);
        assert_eq!(doubled, (0..100).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn no_pooling_is_serial() {
        assert!(matches!(Executor::new(8, true).unwrap(), Executor::Serial));
        assert_eq!(Executor::new(1, false).unwrap().threads(), 1);
    }

    #[test]
    fn uploads_carry_metadata_and_acl() {
        let build = build_tree(&[("index.html", "<html>a</html>"), ("css/site.css", "body{}")]);
        let store = bucket_with(&[]);
        let config = SyncConfig {
            gzip: true,
            cache_control: [("text/css".to_string(), 600)].into_iter().collect(),
            ..SyncConfig::default()
        };
        let resolver = MetadataResolver::new(&config);
        let prefix = KeyPrefix::default();
        let plan = plan_sync(&local_files(&build), RemoteIndex::new(), &DiffOptions::default());

        let report = execute(
            &store,
            &plan,
            &settings(&prefix, &resolver, false),
            &Executor::Serial,
        );
        assert_eq!(report.uploaded, 2);
        assert!(report.failures.is_empty());

        let html = store.get("index.html").unwrap();
        assert_eq!(html.body, b"<html>a</html>");
        assert_eq!(html.content_type.as_deref(), Some("text/html"));
        assert_eq!(html.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(html.acl.as_deref(), Some("public-read"));

        let css = store.get("css/site.css").unwrap();
        assert_eq!(css.cache_control.as_deref(), Some("max-age=600"));
    }

    #[test]
    fn uploads_land_under_prefix() {
        let build = build_tree(&[("a.html", "A")]);
        let store = bucket_with(&[]);
        let resolver = MetadataResolver::new(&SyncConfig::default());
        let prefix = KeyPrefix::new("preview");
        let plan = plan_sync(&local_files(&build), RemoteIndex::new(), &DiffOptions::default());

        execute(&store, &plan, &settings(&prefix, &resolver, false), &Executor::Serial);
        assert_eq!(store.keys(), vec!["preview/a.html"]);
    }

    #[test]
    fn one_failed_upload_does_not_stop_others() {
        let build = build_tree(&[("a.html", "A"), ("b.html", "B"), ("c.html", "C")]);
        let store = bucket_with(&[]);
        store.fail_put("b.html");
        let resolver = MetadataResolver::new(&SyncConfig::default());
        let prefix = KeyPrefix::default();
        let plan = plan_sync(&local_files(&build), RemoteIndex::new(), &DiffOptions::default());
        let executor = Executor::new(4, false).unwrap();

        let report = upload_all(
            &store,
            &plan.uploads,
            &settings(&prefix, &resolver, false),
            &executor,
        );
        assert_eq!(report.uploaded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "b.html");
        assert_eq!(report.failed_uploads().into_iter().collect::<Vec<_>>(), vec!["b.html"]);
        assert!(store.contains("a.html"));
        assert!(store.contains("c.html"));
    }

    #[test]
    fn unreadable_file_is_a_per_file_failure() {
        let build = build_tree(&[("a.html", "A"), ("b.html", "B")]);
        let store = bucket_with(&[]);
        let files = local_files(&build);
        std::fs::remove_file(build.path().join("a.html")).unwrap();
        let resolver = MetadataResolver::new(&SyncConfig::default());
        let prefix = KeyPrefix::default();
        let plan = plan_sync(&files, RemoteIndex::new(), &DiffOptions::default());

        let report = execute(&store, &plan, &settings(&prefix, &resolver, false), &Executor::Serial);
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.failures[0].phase, Phase::Upload);
        assert_eq!(report.failures[0].key, "a.html");
    }

    #[test]
    fn deletes_are_chunked() {
        let store = MemoryStoreWith::keys(377);
        let resolver = MetadataResolver::new(&SyncConfig::default());
        let prefix = KeyPrefix::default();

        let report = delete_all(&store.0, &keys(377), &settings(&prefix, &resolver, false));
        assert_eq!(report.deleted, 377);
        let sizes: Vec<usize> = store.0.delete_batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![100, 100, 100, 77]);
        assert!(store.0.keys().is_empty());
    }

    #[test]
    fn failed_chunk_is_skipped_not_fatal() {
        let store = MemoryStoreWith::keys(250);
        store.0.fail_delete_call_containing("old/0150.html");
        let resolver = MetadataResolver::new(&SyncConfig::default());
        let prefix = KeyPrefix::default();

        let report = delete_all(&store.0, &keys(250), &settings(&prefix, &resolver, false));
        assert_eq!(report.deleted, 150);
        assert_eq!(report.failures.len(), 100);
        assert!(report.failures.iter().all(|f| f.phase == Phase::Delete));
        assert_eq!(store.0.delete_batches().len(), 3);
    }

    #[test]
    fn rejected_keys_are_not_counted() {
        let store = bucket_with(&[("site/a", "1"), ("site/b", "2")]);
        store.reject_delete("site/b");
        let resolver = MetadataResolver::new(&SyncConfig::default());
        let prefix = KeyPrefix::new("site");
        let doomed: BTreeSet<String> = ["a".to_string(), "b".to_string()].into();

        let report = delete_all(&store, &doomed, &settings(&prefix, &resolver, false));
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failures[0].key, "b");
        assert!(store.contains("site/b"));
    }

    #[test]
    fn dry_run_counts_without_calls() {
        let build = build_tree(&[("a.html", "A"), ("b.html", "B")]);
        let store = bucket_with(&[("stale.html", "S")]);
        let resolver = MetadataResolver::new(&SyncConfig::default());
        let prefix = KeyPrefix::default();
        let plan = plan_sync(&local_files(&build), remote_index(&store), &DiffOptions::default());
        store.clear_operations();

        let report = execute(&store, &plan, &settings(&prefix, &resolver, true), &Executor::Serial);
        assert_eq!(report.uploaded, 2);
        assert_eq!(report.deleted, 1);
        assert!(store.operations().is_empty());
        assert_eq!(store.keys(), vec!["stale.html"]);
    }

    /// Bucket preloaded with the keys [`keys`] produces.
    struct MemoryStoreWith(crate::store::MemoryStore);

    impl MemoryStoreWith {
        fn keys(n: usize) -> Self {
            let store = bucket_with(&[]);
            for key in keys(n) {
                store.insert(key.as_str(), "x");
            }
            Self(store)
        }
    }
}
