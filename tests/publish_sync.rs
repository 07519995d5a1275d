//! End-to-end publish runs against an in-memory bucket.
//!
//! Each test builds a temp build directory, seeds a `MemoryStore`, runs the
//! publisher through its public API and inspects both the report and the
//! bucket afterwards.
//!
//! Run with: cargo test --test publish_sync

use bakery::config::PublishConfig;
use bakery::hooks::HookRegistry;
use bakery::publish::{PublishModes, PublishReport, Publisher};
use bakery::store::MemoryStore;
use bakery::store::memory::RecordedOp;
use bakery::transfer::Phase;
use std::path::Path;
use tempfile::TempDir;

fn build_tree(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (rel, contents) in files {
        let path = tmp.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
    tmp
}

fn bucket_with(objects: &[(&str, &str)]) -> MemoryStore {
    let store = MemoryStore::new("site-bucket");
    for (key, body) in objects {
        store.insert(*key, body.as_bytes());
    }
    store
}

fn config_for(build: &Path) -> PublishConfig {
    let mut config = PublishConfig::default();
    config.build_dir = build.to_string_lossy().into_owned();
    config.bucket.name = "site-bucket".into();
    config
}

fn run(config: &PublishConfig, modes: PublishModes, store: &MemoryStore) -> PublishReport {
    Publisher::new(config, modes, store, &HookRegistry::new())
        .publish()
        .unwrap()
}

fn upload_keys(report: &PublishReport) -> Vec<&str> {
    let mut keys: Vec<&str> = report.plan.uploads.iter().map(|u| u.key.as_str()).collect();
    keys.sort_unstable();
    keys
}

fn deletion_keys(report: &PublishReport) -> Vec<&str> {
    report.plan.deletions.iter().map(String::as_str).collect()
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn fresh_bucket_receives_whole_tree() {
    let build = build_tree(&[("a.html", "<html>a</html>"), ("b.css", "body{}")]);
    let store = bucket_with(&[]);

    let report = run(&config_for(build.path()), PublishModes::default(), &store);

    assert_eq!(upload_keys(&report), vec!["a.html", "b.css"]);
    assert!(deletion_keys(&report).is_empty());
    assert_eq!(report.uploaded, 2);
    assert_eq!(store.keys(), vec!["a.html", "b.css"]);
    assert_eq!(
        store.get("a.html").unwrap().etag,
        "\"ce2f7a10233be44a75894a307ae6dc7f\""
    );
    assert_eq!(
        store.get("b.css").unwrap().etag,
        "\"aa676972bbd2b68e94ef8e91e81d20be\""
    );
}

#[test]
fn unchanged_page_with_stale_object() {
    let build = build_tree(&[("a.html", "X")]);
    let store = bucket_with(&[("a.html", "X"), ("stale.txt", "old")]);

    let report = run(&config_for(build.path()), PublishModes::default(), &store);

    assert!(upload_keys(&report).is_empty());
    assert_eq!(deletion_keys(&report), vec!["stale.txt"]);
    assert!(store.put_keys().is_empty());
    assert_eq!(store.keys(), vec!["a.html"]);
}

#[test]
fn changed_page_with_stale_object() {
    let build = build_tree(&[("a.html", "Y")]);
    let store = bucket_with(&[("a.html", "X"), ("stale.txt", "old")]);

    let report = run(&config_for(build.path()), PublishModes::default(), &store);

    assert_eq!(upload_keys(&report), vec!["a.html"]);
    assert_eq!(deletion_keys(&report), vec!["stale.txt"]);
    assert_eq!(store.get("a.html").unwrap().body, b"Y");
    assert_eq!(store.keys(), vec!["a.html"]);
}

// =========================================================================
// Properties
// =========================================================================

#[test]
fn second_run_is_a_no_op() {
    let build = build_tree(&[
        ("index.html", "home"),
        ("css/site.css", "body{}"),
        ("2024/05/index.html", "may"),
    ]);
    let store = bucket_with(&[("old.html", "gone soon")]);
    let config = config_for(build.path());

    let first = run(&config, PublishModes::default(), &store);
    assert_eq!(first.uploaded, 3);
    assert_eq!(first.deleted, 1);

    store.clear_operations();
    let second = run(&config, PublishModes::default(), &store);
    assert!(second.plan.is_empty());
    assert_eq!(second.uploaded, 0);
    assert_eq!(second.deleted, 0);
    assert!(store.put_keys().is_empty());
    assert!(store.delete_batches().is_empty());
}

#[test]
fn every_remote_only_key_is_deleted() {
    let build = build_tree(&[("keep.html", "k")]);
    let mut remote: Vec<(String, &str)> = (0..40)
        .map(|i| (format!("archive/{i:03}/index.html"), "old"))
        .collect();
    remote.push(("keep.html".to_string(), "k"));
    let store = MemoryStore::new("site-bucket");
    for (key, body) in &remote {
        store.insert(key.as_str(), *body);
    }
    let mut config = config_for(build.path());
    config.publish.list_page_size = 7;
    config.publish.delete_chunk_size = 9;

    let report = run(&config, PublishModes::default(), &store);

    assert_eq!(report.deleted, 40);
    assert_eq!(store.keys(), vec!["keep.html"]);
}

#[test]
fn no_delete_keeps_remote_only_keys() {
    let build = build_tree(&[("a.html", "X")]);
    let store = bucket_with(&[("a.html", "X"), ("stale.txt", "old"), ("b/c.js", "c")]);
    let modes = PublishModes {
        no_delete: true,
        ..PublishModes::default()
    };

    let report = run(&config_for(build.path()), modes, &store);

    assert_eq!(report.deleted, 0);
    assert!(store.contains("stale.txt"));
    assert!(store.contains("b/c.js"));
    assert!(store.delete_batches().is_empty());
}

#[test]
fn force_uploads_identical_files() {
    let build = build_tree(&[("a.html", "X"), ("b.css", "B")]);
    let store = bucket_with(&[("a.html", "X"), ("b.css", "B")]);
    let modes = PublishModes {
        force: true,
        ..PublishModes::default()
    };

    let report = run(&config_for(build.path()), modes, &store);

    assert_eq!(upload_keys(&report), vec!["a.html", "b.css"]);
    let mut puts = store.put_keys();
    puts.sort();
    assert_eq!(puts, vec!["a.html", "b.css"]);
}

#[test]
fn multipart_object_with_matching_content_is_skipped() {
    // 8 MiB of 'a' then 1 MiB of 'b', uploaded in two default-size parts.
    let mut data = vec![b'a'; 8 * 1024 * 1024];
    data.extend(std::iter::repeat_n(b'b', 1024 * 1024));
    let build = TempDir::new().unwrap();
    std::fs::write(build.path().join("video.mp4"), &data).unwrap();

    let store = bucket_with(&[]);
    store.insert_with_etag(
        "video.mp4",
        data.clone(),
        "\"42248132da61be10812ed6f6878c87af-2\"",
    );

    let report = run(&config_for(build.path()), PublishModes::default(), &store);
    assert!(report.plan.is_empty());
    assert_eq!(report.plan.unchanged, 1);
}

#[test]
fn multipart_object_with_other_content_is_reuploaded() {
    let build = build_tree(&[("video.mp4", "different")]);
    let store = bucket_with(&[]);
    store.insert_with_etag(
        "video.mp4",
        "whatever",
        "\"42248132da61be10812ed6f6878c87af-2\"",
    );

    let report = run(&config_for(build.path()), PublishModes::default(), &store);
    assert_eq!(upload_keys(&report), vec!["video.mp4"]);
}

#[test]
fn touched_but_identical_file_is_skipped() {
    let build = build_tree(&[("a.html", "X")]);
    let store = bucket_with(&[("a.html", "X")]);
    let file = std::fs::File::options()
        .write(true)
        .open(build.path().join("a.html"))
        .unwrap();
    file.set_modified(std::time::SystemTime::now()).unwrap();

    let report = run(&config_for(build.path()), PublishModes::default(), &store);
    assert!(report.plan.uploads.is_empty());
}

#[test]
fn deletes_go_out_in_chunks_of_one_hundred() {
    let build = build_tree(&[]);
    let store = MemoryStore::new("site-bucket");
    for i in 0..377 {
        store.insert(format!("old/{i:04}.html"), "x");
    }

    let report = run(&config_for(build.path()), PublishModes::default(), &store);

    let sizes: Vec<usize> = store.delete_batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![100, 100, 100, 77]);
    assert_eq!(report.deleted, 377);
    assert!(store.keys().is_empty());
}

// =========================================================================
// Modes and failures
// =========================================================================

#[test]
fn dry_run_mutates_nothing_but_reports_everything() {
    let build = build_tree(&[("a.html", "Y"), ("new.css", "N")]);
    let store = bucket_with(&[("a.html", "X"), ("stale.txt", "old")]);
    let modes = PublishModes {
        dry_run: true,
        ..PublishModes::default()
    };

    let report = run(&config_for(build.path()), modes, &store);

    assert_eq!(report.uploaded, 2);
    assert_eq!(report.deleted, 1);
    assert!(report.changed_nothing());
    assert!(
        store
            .operations()
            .iter()
            .all(|op| matches!(op, RecordedOp::List { .. }))
    );
    assert_eq!(store.get("a.html").unwrap().body, b"X");
    assert!(store.contains("stale.txt"));
}

#[test]
fn one_failed_upload_leaves_the_rest_published() {
    let build = build_tree(&[("a.html", "A"), ("b.html", "B"), ("c.html", "C")]);
    let store = bucket_with(&[("stale.txt", "old")]);
    store.fail_put("b.html");

    let report = run(&config_for(build.path()), PublishModes::default(), &store);

    assert_eq!(report.uploaded, 2);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.failures_in(Phase::Upload), 1);
    assert_eq!(report.failures[0].key, "b.html");
    assert_eq!(store.keys(), vec!["a.html", "c.html"]);

    // The next run plans exactly what is missing.
    let retry = run(&config_for(build.path()), PublishModes::default(), &store);
    assert_eq!(upload_keys(&retry), vec!["b.html"]);
    assert!(retry.plan.deletions.is_empty());
}

#[cfg(unix)]
#[test]
fn dangling_symlink_does_not_stop_the_run() {
    let build = build_tree(&[("a.html", "A")]);
    std::os::unix::fs::symlink(
        build.path().join("missing.css"),
        build.path().join("broken.css"),
    )
    .unwrap();
    let store = bucket_with(&[("stale.txt", "old")]);

    let report = run(&config_for(build.path()), PublishModes::default(), &store);

    assert_eq!(report.local_files, 1);
    assert_eq!(upload_keys(&report), vec!["a.html"]);
    assert!(!report.has_failures());
    assert_eq!(store.keys(), vec!["a.html"]);
}

#[test]
fn prefix_scopes_upload_listing_and_deletion() {
    let build = build_tree(&[("index.html", "new")]);
    let store = bucket_with(&[
        ("preview/index.html", "old"),
        ("preview/stale.html", "s"),
        ("live/index.html", "live"),
    ]);
    let mut config = config_for(build.path());
    config.bucket.prefix = "preview".into();

    let report = run(&config, PublishModes::default(), &store);

    assert_eq!(report.prefix, "preview/");
    assert_eq!(upload_keys(&report), vec!["index.html"]);
    assert_eq!(deletion_keys(&report), vec!["stale.html"]);
    assert_eq!(store.keys(), vec!["live/index.html", "preview/index.html"]);
    assert_eq!(store.get("preview/index.html").unwrap().body, b"new");
}

#[test]
fn uploads_are_public_with_resolved_headers() {
    let build = build_tree(&[("index.html", "<html>"), ("data.bin", "\u{1f}")]);
    let store = bucket_with(&[]);
    let mut config = config_for(build.path());
    config.publish.gzip = true;
    config
        .publish
        .cache_control
        .insert("text/html".into(), 300);

    run(&config, PublishModes::default(), &store);

    let page = store.get("index.html").unwrap();
    assert_eq!(page.content_type.as_deref(), Some("text/html"));
    assert_eq!(page.content_encoding.as_deref(), Some("gzip"));
    assert_eq!(page.cache_control.as_deref(), Some("max-age=300"));
    assert_eq!(page.acl.as_deref(), Some("public-read"));

    let blob = store.get("data.bin").unwrap();
    assert_eq!(blob.content_type, None);
    assert_eq!(blob.content_encoding, None);
}

#[test]
fn report_serializes_to_json() {
    let build = build_tree(&[("a.html", "A")]);
    let store = bucket_with(&[]);

    let report = run(&config_for(build.path()), PublishModes::default(), &store);
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();

    assert_eq!(json["kind"], "publish");
    assert_eq!(json["bucket"], "site-bucket");
    assert_eq!(json["uploaded"], 1);
    assert_eq!(json["plan"]["uploads"][0]["key"], "a.html");
    assert_eq!(json["plan"]["uploads"][0]["reason"], "new");
    assert_eq!(json["modes"]["dry_run"], false);
}
