//! Post-publish hooks.
//!
//! Some pages need remote work after their bytes are in the bucket. The
//! canonical case is a redirect page: S3 serves a website redirect only
//! when the object carries `x-amz-website-redirect-location`, which is set
//! by copying the object onto itself with replaced metadata.
//!
//! Hooks implement [`PostPublishHook`] and are registered at startup in a
//! [`HookRegistry`] against a build-path pattern (a regex anchored at both
//! ends). After the transfer phase the publisher asks the registry for the
//! hooks matching each local key and runs them with the store handle. What
//! a hook does is its own business.
//!
//! ```text
//! registry.register_exact("old-about/index.html", RedirectHook::new("/about/"))
//! registry.register(r"legacy/.*\.html", RedirectHook::new("/"))
//! ```

use crate::config::RedirectRule;
use crate::store::{CopyRequest, ObjectStore, StoreError};
use regex::Regex;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HookError {
    #[error("Invalid hook pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Hook {hook} failed for {key}: {source}")]
    Store {
        hook: String,
        key: String,
        #[source]
        source: StoreError,
    },
}

/// What a hook sees about the page it runs for.
pub struct HookContext<'a> {
    pub store: &'a dyn ObjectStore,
    /// Relative key of the page.
    pub key: &'a str,
    /// Full object key, prefix included.
    pub object_key: &'a str,
    /// Local file the page was published from.
    pub build_path: &'a Path,
    /// Canned ACL the run publishes with.
    pub acl: Option<&'a str>,
}

/// Remote work to do for a page once it has been uploaded.
pub trait PostPublishHook: Send + Sync {
    /// Short label for logs and reports.
    fn name(&self) -> &str;

    fn post_publish(&self, ctx: &HookContext<'_>) -> Result<(), HookError>;
}

/// Turns the uploaded page into an S3 website redirect.
///
/// Copies the object onto itself with `Content-Type: text/html`, replaced
/// metadata and the redirect location, then re-applies the run's ACL since
/// a metadata-replacing copy resets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectHook {
    location: String,
}

impl RedirectHook {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl PostPublishHook for RedirectHook {
    fn name(&self) -> &str {
        "redirect"
    }

    fn post_publish(&self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        ctx.store
            .copy_object(CopyRequest {
                key: ctx.object_key.to_string(),
                content_type: Some("text/html".to_string()),
                website_redirect: Some(self.location.clone()),
                acl: ctx.acl.map(str::to_string),
            })
            .map_err(|source| HookError::Store {
                hook: self.name().to_string(),
                key: ctx.key.to_string(),
                source,
            })
    }
}

struct Registration {
    pattern: Regex,
    hook: Box<dyn PostPublishHook>,
}

/// Hooks keyed by build-path pattern, in registration order.
#[derive(Default)]
pub struct HookRegistry {
    entries: Vec<Registration>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with one [`RedirectHook`] per configured redirect.
    pub fn from_redirects(rules: &[RedirectRule]) -> Result<Self, HookError> {
        let mut registry = Self::new();
        for rule in rules {
            registry.register_exact(&rule.path, RedirectHook::new(&rule.location))?;
        }
        Ok(registry)
    }

    /// Register `hook` for every relative key fully matching `pattern`.
    pub fn register(
        &mut self,
        pattern: &str,
        hook: impl PostPublishHook + 'static,
    ) -> Result<(), HookError> {
        let anchored = format!("^(?:{pattern})$");
        let pattern = Regex::new(&anchored).map_err(|source| HookError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.entries.push(Registration {
            pattern,
            hook: Box::new(hook),
        });
        Ok(())
    }

    /// Register `hook` for exactly one relative key.
    pub fn register_exact(
        &mut self,
        key: &str,
        hook: impl PostPublishHook + 'static,
    ) -> Result<(), HookError> {
        self.register(&regex::escape(key.trim_start_matches('/')), hook)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hooks registered for `key`, in registration order.
    pub fn matching<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a dyn PostPublishHook> {
        self.entries
            .iter()
            .filter(move |entry| entry.pattern.is_match(key))
            .map(|entry| entry.hook.as_ref())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|e| (e.pattern.as_str(), e.hook.name())),
            )
            .finish()
    }
}
