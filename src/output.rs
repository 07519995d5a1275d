//! CLI output formatting.
//!
//! Diagnostics go through `tracing` to stderr. What a user reads at the end
//! of a run goes to stdout from here.
//!
//! # Output Format
//!
//! ## Publish
//!
//! ```text
//! Bucket: my-site (prefix preview/)
//! Local:  12 files, 48.2 KiB
//! Remote: 11 objects
//! Plan:   2 to upload, 1 to delete, 10 unchanged
//!     creating about/index.html
//!     updating css/site.css
//!     deleting old/index.html
//! Uploaded 2 files, deleted 1 object, ran 1 hook in 0.8s
//! ```
//!
//! The indented key lines only appear in verbose mode. Failures are listed
//! after the summary, one per line. A dry run ends with an explicit notice
//! that nothing was changed.
//!
//! ## Check
//!
//! ```text
//! build/: 12 files, 48.2 KiB
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::publish::{PublishReport, RunKind};
use crate::scan::LocalFile;
use crate::transfer::Phase;
use std::path::Path;

const DRY_RUN_NOTICE: &str = "Dry run: No content was changed.";

/// `n` followed by `word`, pluralized with an `s`.
fn count(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Human-readable byte size in binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Upload => "upload",
        Phase::Delete => "delete",
        Phase::Hook => "hook",
    }
}

fn bucket_line(report: &PublishReport) -> String {
    if report.prefix.is_empty() {
        format!("Bucket: {}", report.bucket)
    } else {
        format!("Bucket: {} (prefix {})", report.bucket, report.prefix)
    }
}

fn remote_line(report: &PublishReport) -> String {
    match report.remote_objects {
        Some(n) => format!("Remote: {}", count(n, "object")),
        None => "Remote: listing skipped".to_string(),
    }
}

/// Summary of a publish or unpublish run.
pub fn format_report(report: &PublishReport, verbose: bool) -> Vec<String> {
    let mut lines = vec![bucket_line(report)];
    if report.kind == RunKind::Publish {
        lines.push(format!(
            "Local:  {}, {}",
            count(report.local_files, "file"),
            format_bytes(report.local_bytes)
        ));
    }
    lines.push(remote_line(report));

    let plan = &report.plan;
    match report.kind {
        RunKind::Publish => lines.push(format!(
            "Plan:   {} to upload, {} to delete, {} unchanged",
            plan.uploads.len(),
            plan.deletions.len(),
            plan.unchanged
        )),
        RunKind::Unpublish => {
            lines.push(format!("Plan:   {} to delete", plan.deletions.len()));
        }
    }

    if verbose {
        for upload in &plan.uploads {
            lines.push(format!("    {} {}", upload.reason.verb(), upload.key));
        }
        for key in &plan.deletions {
            lines.push(format!("    deleting {key}"));
        }
    }

    let seconds = report.elapsed_ms as f64 / 1000.0;
    let summary = match report.kind {
        RunKind::Publish => format!(
            "uploaded {}, deleted {}, ran {}",
            count(report.uploaded, "file"),
            count(report.deleted, "object"),
            count(report.hooks_run, "hook")
        ),
        RunKind::Unpublish => format!("deleted {}", count(report.deleted, "object")),
    };
    let summary = if report.modes.dry_run {
        format!("Would have {summary}")
    } else {
        capitalize(&summary)
    };
    lines.push(format!("{summary} in {seconds:.1}s"));

    if report.has_failures() {
        lines.push(count(report.failures.len(), "failure") + ":");
        for failure in &report.failures {
            lines.push(format!(
                "    {} {}: {}",
                phase_label(failure.phase),
                failure.key,
                failure.message
            ));
        }
    }

    if report.modes.dry_run {
        lines.push(DRY_RUN_NOTICE.to_string());
    }
    lines
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn print_report(report: &PublishReport, verbose: bool) {
    for line in format_report(report, verbose) {
        println!("{line}");
    }
}

/// Inventory of a build directory.
pub fn format_check(build_dir: &Path, files: &[LocalFile], verbose: bool) -> Vec<String> {
    let bytes: u64 = files.iter().map(|f| f.size).sum();
    let mut lines = vec![format!(
        "{}: {}, {}",
        build_dir.display(),
        count(files.len(), "file"),
        format_bytes(bytes)
    )];
    if verbose {
        for file in files {
            lines.push(format!("    {} ({})", file.key, format_bytes(file.size)));
        }
    }
    lines
}

pub fn print_check(build_dir: &Path, files: &[LocalFile], verbose: bool) {
    for line in format_check(build_dir, files, verbose) {
        println!("{line}");
    }
}
