// ABOUTME: Extraction strategies for search results pages.
// ABOUTME: Groups the selector cache, site profiles, listing locator and per-node field extractors.

//! Extraction module.
//!
//! Submodules:
//! - `compiled`: process-wide cache of parsed CSS selectors.
//! - `profile`: data-driven ordered strategy tables per site.
//! - `locator`: finds the listing nodes on a page.
//! - `fields`: name, price and link extractors for one listing node.

pub mod compiled;
pub mod fields;
pub mod locator;
pub mod profile;
