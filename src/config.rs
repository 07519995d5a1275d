//! Publisher configuration.
//!
//! Handles loading, layering, and validating `bakery.toml`. Configuration is
//! resolved from three layers, each overriding the one before it:
//!
//! ```text
//! stock defaults  →  bakery.toml  →  command-line flags
//! ```
//!
//! Every layer is a TOML table; layers are deep-merged key by key
//! ([`merge_toml`]) and the result is deserialized and validated once. The
//! resolved [`PublishConfig`] is passed explicitly to the publisher; nothing
//! reads configuration from global state.
//!
//! ## Configuration Options
//!
//! ```toml
//! build_dir = "build"               # Directory holding the baked site
//!
//! [bucket]
//! name = "www.example.com"          # Required
//! prefix = ""                       # Publish under a key prefix
//! region = "us-east-1"              # Optional, else the AWS default chain
//! endpoint = "http://localhost:9000" # Optional S3-compatible host
//! acl = "public-read"               # Canned ACL; "" sends none
//!
//! [publish]
//! gzip = false                      # Files of gzip_content_types are pre-gzipped
//! gzip_content_types = ["text/css", "text/html", ...]
//! delete_chunk_size = 100           # Keys per batch-delete call
//! list_page_size = 1000             # Keys per listing page
//! multipart_chunk_size = 8388608    # Part size used for multipart ETags
//!
//! [publish.cache_control]
//! "text/html" = 300                 # max-age seconds per content type
//!
//! [processing]
//! max_processes = 4                 # Upload workers (omit for auto = CPU cores)
//!
//! [[redirects]]
//! path = "old/index.html"           # Build path of a redirect page
//! location = "/new/"                # Where S3 should redirect it
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "bakery.toml";

/// Upper bound S3 places on keys per DeleteObjects and per ListObjectsV2 page.
pub const MAX_KEYS_PER_REQUEST: usize = 1000;

/// Canned ACLs accepted by S3 for objects.
const CANNED_ACLS: &[&str] = &[
    "private",
    "public-read",
    "public-read-write",
    "authenticated-read",
    "aws-exec-read",
    "bucket-owner-read",
    "bucket-owner-full-control",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Complete publisher configuration.
///
/// All fields except `bucket.name` have usable defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    /// Directory containing the already-built site.
    pub build_dir: String,
    /// Target bucket and how to reach it.
    pub bucket: BucketConfig,
    /// Sync behavior: encoding, caching, and request sizing.
    pub publish: SyncConfig,
    /// Parallel upload settings.
    pub processing: ProcessingConfig,
    /// Build paths that S3 should serve as redirects.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redirects: Vec<RedirectRule>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            build_dir: "build".to_string(),
            bucket: BucketConfig::default(),
            publish: SyncConfig::default(),
            processing: ProcessingConfig::default(),
            redirects: Vec::new(),
        }
    }
}

impl PublishConfig {
    /// Validate config values are present and within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "build directory unconfigured: set build_dir or pass --build-dir".into(),
            ));
        }
        if self.bucket.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "bucket name unconfigured: set bucket.name or pass --aws-bucket-name".into(),
            ));
        }
        if !self.bucket.acl.is_empty() && !CANNED_ACLS.contains(&self.bucket.acl.as_str()) {
            return Err(ConfigError::Validation(format!(
                "bucket.acl must be one of {} (or empty), got {:?}",
                CANNED_ACLS.join(", "),
                self.bucket.acl
            )));
        }
        if !(1..=MAX_KEYS_PER_REQUEST).contains(&self.publish.delete_chunk_size) {
            return Err(ConfigError::Validation(format!(
                "publish.delete_chunk_size must be 1-{MAX_KEYS_PER_REQUEST}"
            )));
        }
        if !(1..=MAX_KEYS_PER_REQUEST).contains(&self.publish.list_page_size) {
            return Err(ConfigError::Validation(format!(
                "publish.list_page_size must be 1-{MAX_KEYS_PER_REQUEST}"
            )));
        }
        if self.publish.multipart_chunk_size == 0 {
            return Err(ConfigError::Validation(
                "publish.multipart_chunk_size must be non-zero".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        for rule in &self.redirects {
            if rule.path.is_empty() || rule.location.is_empty() {
                return Err(ConfigError::Validation(
                    "redirects entries need both path and location".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Target bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BucketConfig {
    /// Bucket name. Required.
    pub name: String,
    /// Key prefix every published object is stored under.
    pub prefix: String,
    /// AWS region; falls back to the provider chain when absent.
    pub region: Option<String>,
    /// Custom S3-compatible endpoint URL.
    pub endpoint: Option<String>,
    /// Canned ACL applied to uploads. Empty sends no ACL header.
    pub acl: String,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            prefix: String::new(),
            region: None,
            endpoint: None,
            acl: "public-read".to_string(),
        }
    }
}

impl BucketConfig {
    /// The ACL to send, or `None` when disabled.
    pub fn canned_acl(&self) -> Option<&str> {
        (!self.acl.is_empty()).then_some(self.acl.as_str())
    }
}

/// Content types published with `Content-Encoding: gzip` when gzip is on.
pub fn default_gzip_content_types() -> Vec<String> {
    [
        "text/css",
        "text/html",
        "application/javascript",
        "application/x-javascript",
        "application/json",
        "application/xml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Whether the build wrote gzip-compressed files for `gzip_content_types`.
    pub gzip: bool,
    /// Content types that carry `Content-Encoding: gzip` when `gzip` is on.
    pub gzip_content_types: Vec<String>,
    /// Content type → `max-age` seconds for the `Cache-Control` header.
    pub cache_control: BTreeMap<String, u64>,
    /// Keys per batch-delete call.
    pub delete_chunk_size: usize,
    /// Keys requested per listing page.
    pub list_page_size: usize,
    /// Part size assumed when comparing against multipart ETags.
    pub multipart_chunk_size: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            gzip: false,
            gzip_content_types: default_gzip_content_types(),
            cache_control: BTreeMap::new(),
            delete_chunk_size: 100,
            list_page_size: MAX_KEYS_PER_REQUEST,
            multipart_chunk_size: crate::digest::MULTIPART_CHUNK_SIZE,
        }
    }
}

/// Parallel upload settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel transfer workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// A build path S3 should serve as a website redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedirectRule {
    /// Build path of the redirect page, e.g. `old/index.html`.
    pub path: String,
    /// Redirect target, e.g. `/new/` or an absolute URL.
    pub location: String,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PublishConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge overlays in order onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<PublishConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_toml);
    let config: PublishConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path` with optional command-line overrides on top.
///
/// A missing file is not an error: stock defaults plus overrides are used,
/// and validation decides whether that is enough (it needs a bucket name).
pub fn load_config(
    path: &Path,
    overrides: Option<toml::Value>,
) -> Result<PublishConfig, ConfigError> {
    let base = stock_defaults_value();
    let file = load_raw_config(path)?;
    resolve_config(base, file.into_iter().chain(overrides))
}

/// Returns a fully-commented stock `bakery.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Bakery Configuration
# ====================
# Values shown below are the defaults. Only bucket.name is required.
# Command-line flags override anything set here.
# Unknown keys will cause an error.

# Directory holding the already-built static site.
build_dir = "build"

# ---------------------------------------------------------------------------
# Target bucket
# ---------------------------------------------------------------------------
[bucket]
# Bucket to keep in sync with build_dir.
name = ""

# Publish everything under this key prefix (e.g. "preview/").
prefix = ""

# AWS region. Omit to use AWS_REGION / the active profile.
# region = "us-east-1"

# S3-compatible endpoint (MinIO, R2, ...). Enables path-style addressing.
# endpoint = "http://localhost:9000"

# Canned ACL applied to every upload. Set to "" to send none
# (required for buckets with ACLs disabled).
acl = "public-read"

# ---------------------------------------------------------------------------
# Sync behavior
# ---------------------------------------------------------------------------
[publish]
# Set when the build wrote gzip-compressed files. Files whose content type
# is listed below are then published with Content-Encoding: gzip.
# Files that are already gzip (by magic bytes or .gz) always get the header.
gzip = false
gzip_content_types = [
    "text/css",
    "text/html",
    "application/javascript",
    "application/x-javascript",
    "application/json",
    "application/xml",
]

# Keys per batch-delete request (S3 allows up to 1000).
delete_chunk_size = 100

# Keys per listing page (S3 allows up to 1000).
list_page_size = 1000

# Part size assumed when a remote ETag comes from a multipart upload.
multipart_chunk_size = 8388608

# Cache-Control max-age (seconds) per content type.
[publish.cache_control]
# "text/html" = 300
# "image/png" = 86400

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel upload workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Redirects
# ---------------------------------------------------------------------------
# Build paths S3 should serve as redirects after publishing.
# [[redirects]]
# path = "old-page/index.html"
# location = "/new-page/"
"##
}
