// ABOUTME: Site profile data model: ordered selector strategy tables for listing, name, price and link.
// ABOUTME: Provides load_builtin_profile() for the embedded Danawa profile and from_json() for custom ones.

//! Site profiles.
//!
//! A profile is the data-driven half of the extraction pipeline. Every field
//! extractor walks one of these tables in order and the first strategy that
//! yields an acceptable value wins, so supporting a markup variant means
//! adding or reordering selectors here rather than adding code.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;
use crate::extractors::compiled::precompile_selectors;

/// Embedded JSON for the built-in Danawa search results profile.
const BUILTIN_PROFILE_JSON: &str = include_str!("../../data/danawa_profile.json");

/// Fallback that scans every hyperlink in a node for a long, price-free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkScan {
    /// Selector for hyperlink-like descendants
    pub selector: String,
    /// Text must be strictly longer than this many characters
    pub min_chars: usize,
    /// Texts containing this marker look like prices and are skipped
    pub exclude: String,
}

/// Ordered strategies for the product name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameStrategy {
    pub selectors: Vec<String>,
    /// Attribute consulted when the element text is missing or too short
    #[serde(default = "default_title_attr")]
    pub title_attr: String,
    /// Text or attribute must be strictly longer than this many characters
    #[serde(default = "default_name_min_chars")]
    pub min_chars: usize,
    #[serde(default)]
    pub link_scan: Option<LinkScan>,
}

/// Ordered strategies and sanity range for the price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceStrategy {
    pub selectors: Vec<String>,
    #[serde(default = "default_min_digits")]
    pub min_digits: usize,
    pub min: u64,
    pub max: u64,
    /// Marker that follows a number in free text, e.g. `원` in `129,000원`
    pub currency_marker: String,
    #[serde(skip)]
    marker_re: OnceCell<Option<Regex>>,
}

impl PriceStrategy {
    /// Returns true if `value` lies in the inclusive sanity range.
    pub fn in_range(&self, value: u64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Regex matching a comma-grouped number immediately followed by the currency marker.
    pub fn marker_regex(&self) -> Option<&Regex> {
        self.marker_re
            .get_or_init(|| {
                if self.currency_marker.is_empty() {
                    return None;
                }
                let pattern = format!(r"([0-9,]+)\s*{}", regex::escape(&self.currency_marker));
                Regex::new(&pattern).ok()
            })
            .as_ref()
    }
}

/// Ordered strategies for the detail page link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkStrategy {
    pub selectors: Vec<String>,
    #[serde(default = "default_link_attr")]
    pub attr: String,
}

/// A complete extraction profile for one search results site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    pub site: String,
    /// Listing node selectors, most specific first
    pub listing: Vec<String>,
    pub product_name: NameStrategy,
    pub price: PriceStrategy,
    pub link: LinkStrategy,
    /// Nodes examined per page at most
    #[serde(default = "default_max_nodes")]
    pub max_nodes_per_page: usize,
    /// Accepted records kept per page at most
    #[serde(default = "default_max_records")]
    pub max_records_per_page: usize,
}

fn default_title_attr() -> String {
    "title".to_string()
}

fn default_name_min_chars() -> usize {
    3
}

fn default_min_digits() -> usize {
    3
}

fn default_link_attr() -> String {
    "href".to_string()
}

fn default_max_nodes() -> usize {
    50
}

fn default_max_records() -> usize {
    40
}

impl SiteProfile {
    /// Parses a profile from JSON and warms the selector cache with its selectors.
    ///
    /// Fails if the JSON is malformed, the listing table is empty, or the price
    /// range is inverted. Selectors that do not parse are logged and skipped at
    /// extraction time rather than rejected here.
    pub fn from_json(json: &str) -> Result<Self, CrawlError> {
        let profile: SiteProfile = serde_json::from_str(json).map_err(|e| {
            CrawlError::invalid_input(
                "LoadProfile",
                Some(anyhow::anyhow!("malformed profile: {}", e)),
            )
        })?;

        if profile.listing.is_empty() {
            return Err(CrawlError::invalid_input(
                "LoadProfile",
                Some(anyhow::anyhow!("profile {} has no listing selectors", profile.site)),
            ));
        }
        if profile.price.min > profile.price.max {
            return Err(CrawlError::invalid_input(
                "LoadProfile",
                Some(anyhow::anyhow!(
                    "profile {} has price min {} above max {}",
                    profile.site,
                    profile.price.min,
                    profile.price.max
                )),
            ));
        }

        let invalid = precompile_selectors(profile.all_selectors());
        for css in &invalid {
            tracing::warn!(site = %profile.site, selector = %css, "ignoring invalid selector");
        }

        Ok(profile)
    }

    /// Every selector string referenced by the profile, in table order.
    pub fn all_selectors(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        out.extend(self.listing.iter().map(String::as_str));
        out.extend(self.product_name.selectors.iter().map(String::as_str));
        if let Some(scan) = &self.product_name.link_scan {
            out.push(scan.selector.as_str());
        }
        out.extend(self.price.selectors.iter().map(String::as_str));
        out.extend(self.link.selectors.iter().map(String::as_str));
        out
    }
}

/// Loads the built-in Danawa profile from embedded JSON.
///
/// # Panics
///
/// Panics if the embedded JSON is malformed or cannot be deserialized.
pub fn load_builtin_profile() -> SiteProfile {
    SiteProfile::from_json(BUILTIN_PROFILE_JSON).expect("failed to parse builtin profile")
}
