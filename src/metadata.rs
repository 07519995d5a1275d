//! Per-object HTTP metadata.
//!
//! Every upload carries up to three headers, each derived independently:
//!
//! - **Content-Type**: looked up from the key's extension in [`MIME_TYPES`].
//!   Unknown extensions get no header and the store applies its default.
//! - **Content-Encoding**: `gzip` when gzip publishing is on and the content
//!   type is in the configured whitelist (the build step has already
//!   compressed those files), or when the file is gzip data on its own
//!   account: a `.gz` extension or the `1f 8b` magic bytes. Nothing is ever
//!   compressed here.
//! - **Cache-Control**: `max-age=<seconds>` when the content type has an
//!   entry in the configured cache table.
//!
//! For a `.gz` key the content type comes from the inner extension, so
//! `feed.xml.gz` is `application/xml` with gzip encoding.
//!
//! Resolution is a pure function of the key, the first bytes of the body,
//! and configuration. It never touches the filesystem or the network.

use crate::config::SyncConfig;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Extension → MIME type, matched case-insensitively.
pub const MIME_TYPES: &[(&str, &str)] = &[
    // Documents
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("webmanifest", "application/manifest+json"),
    ("xml", "application/xml"),
    ("rss", "application/rss+xml"),
    ("atom", "application/atom+xml"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("ics", "text/calendar"),
    ("pdf", "application/pdf"),
    ("wasm", "application/wasm"),
    // Images
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("ico", "image/x-icon"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    // Fonts
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("eot", "application/vnd.ms-fontobject"),
    // Media
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    // Archives
    ("zip", "application/zip"),
    ("tar", "application/x-tar"),
];

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Headers for one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
}

/// MIME type for `key`'s extension, if known.
pub fn guess_content_type(key: &str) -> Option<&'static str> {
    let extension = extension(key)?;
    MIME_TYPES
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
}

/// Whether `key` or its leading bytes mark the body as gzip data.
pub fn is_gzip_data(key: &str, head: &[u8]) -> bool {
    head.starts_with(&GZIP_MAGIC) || extension(key).is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

fn extension(key: &str) -> Option<&str> {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Key with a trailing `.gz` removed, for type lookup.
fn without_gz(key: &str) -> &str {
    match key.rsplit_once('.') {
        Some((inner, ext)) if ext.eq_ignore_ascii_case("gz") && !inner.is_empty() => inner,
        _ => key,
    }
}

/// Resolves [`ObjectMetadata`] from the gzip and cache settings.
///
/// Built once per run and shared by every transfer worker.
#[derive(Debug, Clone)]
pub struct MetadataResolver {
    gzip: bool,
    gzip_types: HashSet<String>,
    max_ages: BTreeMap<String, u64>,
}

impl MetadataResolver {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            gzip: config.gzip,
            gzip_types: config
                .gzip_content_types
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            max_ages: config
                .cache_control
                .iter()
                .map(|(t, age)| (t.to_ascii_lowercase(), *age))
                .collect(),
        }
    }

    /// Headers for the object at `key` whose body starts with `head`.
    pub fn resolve(&self, key: &str, head: &[u8]) -> ObjectMetadata {
        let content_type = guess_content_type(without_gz(key));

        let whitelisted = self.gzip && content_type.is_some_and(|t| self.gzip_types.contains(t));
        let content_encoding =
            (whitelisted || is_gzip_data(key, head)).then(|| "gzip".to_string());

        let cache_control = content_type
            .and_then(|t| self.max_ages.get(t))
            .map(|age| format!("max-age={age}"));

        ObjectMetadata {
            content_type: content_type.map(str::to_string),
            content_encoding,
            cache_control,
        }
    }
}
