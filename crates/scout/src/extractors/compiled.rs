// ABOUTME: Pre-compiled CSS selector cache for O(1) selector lookup.
// ABOUTME: Every strategy table entry is parsed once per process and shared across jobs.

//! Selector caching for efficient repeated DOM queries.
//!
//! Each listing node is probed with a dozen or more selectors, and a page has
//! up to fifty nodes. Parsing the selector strings dominates if it is redone
//! per node, so compiled selectors are kept in a process-wide cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use scraper::Selector;

/// Thread-safe cache of compiled CSS selectors. Invalid selectors are cached as `None`.
static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Option<Arc<Selector>>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Gets or compiles a CSS selector, caching the result.
///
/// Returns `Some(selector)` if the selector is valid, `None` if invalid.
pub fn get_or_compile(css: &str) -> Option<Arc<Selector>> {
    {
        let cache = SELECTOR_CACHE
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(cached) = cache.get(css) {
            return cached.clone();
        }
    }

    let compiled = Selector::parse(css).ok().map(Arc::new);
    let mut cache = SELECTOR_CACHE
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    // Another thread may have inserted while we were parsing.
    if let Some(cached) = cache.get(css) {
        return cached.clone();
    }
    cache.insert(css.to_string(), compiled.clone());
    compiled
}

/// Precompiles a batch of selectors into the cache.
///
/// Returns the selectors that failed to parse, so callers loading a profile
/// can report them once instead of silently skipping them on every node.
pub fn precompile_selectors<I, S>(selectors: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut invalid = Vec::new();
    for css in selectors {
        let css = css.as_ref();
        if get_or_compile(css).is_none() {
            invalid.push(css.to_string());
        }
    }
    invalid
}
