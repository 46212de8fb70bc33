// ABOUTME: ProductRecord and per-page extraction results produced by the assembler.
// ABOUTME: Records are immutable once built; the secondary marketplace search URL is derived from the name.

use serde::Serialize;

/// External marketplace search endpoint used for the secondary search link.
pub const SECONDARY_SEARCH_BASE: &str = "https://www.coupang.com/np/search?q=";

/// Builds the URL-encoded marketplace search link for a product name.
pub fn secondary_search_url(name: &str) -> String {
    format!("{}{}", SECONDARY_SEARCH_BASE, urlencoding::encode(name))
}

/// One accepted product listing.
///
/// Only the item assembler builds new records, after the name and price have
/// passed acceptance. Field names on the wire follow the download format:
/// `name, price, product_url, coupang_search_url`.
///
/// Records are export-only and cannot be deserialized:
///
/// ```compile_fail
/// let record: listings_scout::ProductRecord =
///     serde_json::from_str(r#"{"name":"","price":5,"product_url":"","coupang_search_url":""}"#)
///         .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductRecord {
    name: String,
    price: u64,
    #[serde(rename = "product_url")]
    source_url: String,
    #[serde(rename = "coupang_search_url")]
    secondary_search_url: String,
}

impl ProductRecord {
    pub(crate) fn new(name: String, price: u64, source_url: String) -> Self {
        let secondary_search_url = secondary_search_url(&name);
        Self {
            name,
            price,
            source_url,
            secondary_search_url,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Price in whole currency units.
    pub fn price(&self) -> u64 {
        self.price
    }

    /// Absolute detail page URL, possibly empty.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn secondary_search_url(&self) -> &str {
        &self.secondary_search_url
    }
}

/// Per-page diagnostics from the item assembler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageReport {
    /// Listing selector that matched, if any
    pub selector: Option<String>,
    /// Page `<title>` text, kept for diagnosing block pages and empty results
    pub title: Option<String>,
    /// Nodes the locator found (before the node cap)
    pub nodes_found: usize,
    /// Nodes actually examined
    pub nodes_seen: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Nodes whose extraction panicked and was contained
    pub failed: usize,
}

/// Records extracted from one page plus the diagnostics for that page.
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    pub records: Vec<ProductRecord>,
    pub report: PageReport,
}

impl PageExtraction {
    /// True if the locator found no listing nodes at all.
    pub fn is_exhausted(&self) -> bool {
        self.report.nodes_found == 0
    }
}
