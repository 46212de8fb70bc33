// ABOUTME: Item assembler turning listing nodes into ProductRecords under the acceptance rule.
// ABOUTME: Each node runs inside a panic boundary so one malformed item never affects the page.

use std::panic::{self, AssertUnwindSafe};

use scraper::{ElementRef, Html};
use tracing::debug;

use crate::extractors::compiled::get_or_compile;
use crate::extractors::fields::{element_text, extract_link, extract_name, extract_price};
use crate::extractors::locator::locate_listings;
use crate::extractors::profile::{PriceStrategy, SiteProfile};
use crate::normalize::{char_len, collapse_whitespace, normalize_name};
use crate::result::{PageExtraction, PageReport, ProductRecord};

/// Minimum normalized name length: names must be strictly longer than this.
pub const MIN_NAME_CHARS: usize = 3;

/// Applies the acceptance rule to one candidate.
///
/// The name is normalized first; the record is accepted iff the normalized
/// name is longer than [`MIN_NAME_CHARS`] characters and the price is
/// non-zero and inside the profile's sanity range.
pub fn accept_candidate(
    raw_name: &str,
    price: u64,
    source_url: String,
    price_rules: &PriceStrategy,
) -> Option<ProductRecord> {
    let name = normalize_name(raw_name);
    if char_len(&name) <= MIN_NAME_CHARS {
        return None;
    }
    if price == 0 || !price_rules.in_range(price) {
        return None;
    }
    Some(ProductRecord::new(name, price, source_url))
}

/// Runs `f`, converting a panic into `None`.
fn within_boundary<T>(f: impl FnOnce() -> T) -> Option<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).ok()
}

/// Outcome of assembling a single node.
#[derive(Debug)]
pub enum ItemOutcome {
    Accepted(ProductRecord),
    Rejected,
    Failed,
}

/// Combines the field extractors of a site profile into product records.
#[derive(Debug, Clone, Copy)]
pub struct Assembler<'p> {
    profile: &'p SiteProfile,
    base_origin: &'p str,
}

impl<'p> Assembler<'p> {
    pub fn new(profile: &'p SiteProfile, base_origin: &'p str) -> Self {
        Self {
            profile,
            base_origin,
        }
    }

    /// Extracts one record from a listing node, or `None` if it fails acceptance.
    pub fn assemble(&self, node: ElementRef<'_>) -> Option<ProductRecord> {
        let raw_name = extract_name(node, &self.profile.product_name)?;
        let price = extract_price(node, &self.profile.price);
        let source_url = extract_link(node, &self.profile.link, self.base_origin);
        accept_candidate(&raw_name, price, source_url, &self.profile.price)
    }

    /// Assembles one node inside the panic boundary.
    pub fn assemble_guarded(&self, node: ElementRef<'_>) -> ItemOutcome {
        match within_boundary(|| self.assemble(node)) {
            Some(Some(record)) => ItemOutcome::Accepted(record),
            Some(None) => ItemOutcome::Rejected,
            None => ItemOutcome::Failed,
        }
    }

    /// Locates the listing nodes of a parsed page and assembles them in order.
    ///
    /// At most `max_nodes_per_page` nodes are examined and assembly stops once
    /// `max_records_per_page` records have been accepted.
    pub fn assemble_page(&self, doc: &Html) -> PageExtraction {
        let mut report = PageReport {
            title: page_title(doc),
            ..Default::default()
        };

        let Some(located) = locate_listings(doc, &self.profile.listing) else {
            debug!(site = %self.profile.site, "no listing selector matched");
            return PageExtraction {
                records: Vec::new(),
                report,
            };
        };

        report.nodes_found = located.nodes.len();
        debug!(
            selector = %located.selector,
            nodes = report.nodes_found,
            "listing selector matched"
        );
        report.selector = Some(located.selector);

        let mut records = Vec::new();
        for node in located.nodes.into_iter().take(self.profile.max_nodes_per_page) {
            report.nodes_seen += 1;
            match self.assemble_guarded(node) {
                ItemOutcome::Accepted(record) => {
                    records.push(record);
                    report.accepted += 1;
                    if records.len() >= self.profile.max_records_per_page {
                        break;
                    }
                }
                ItemOutcome::Rejected => report.rejected += 1,
                ItemOutcome::Failed => {
                    debug!(index = report.nodes_seen - 1, "listing node extraction panicked");
                    report.failed += 1;
                }
            }
        }

        PageExtraction { records, report }
    }
}

/// Text of the page `<title>`, whitespace-collapsed.
fn page_title(doc: &Html) -> Option<String> {
    let selector = get_or_compile("title")?;
    let title = doc
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&element_text(el)))
        .filter(|t| !t.is_empty());
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::profile::load_builtin_profile;
    use pretty_assertions::assert_eq;

    const BASE: &str = "https://www.danawa.com";

    fn item(name: &str, price: &str, href: &str) -> String {
        format!(
            r#"<li class="prod_item">
                <p class="prod_name"><a href="{href}">{name}</a></p>
                <p class="price_sect"><a><strong>{price}</strong>원</a></p>
            </li>"#
        )
    }

    fn page(items: &[String]) -> Html {
        Html::parse_document(&format!(
            r#"<html><head><title>의자 : 다나와 통합검색</title></head>
            <body><ul class="product_list">{}</ul></body></html>"#,
            items.join("\n")
        ))
    }

    #[test]
    fn accept_candidate_rules() {
        let profile = load_builtin_profile();
        let rules = &profile.price;
        assert!(accept_candidate("사무용 의자", 999_999, String::new(), rules).is_some());
        assert!(accept_candidate("사무용 의자", 500, String::new(), rules).is_none());
        assert!(accept_candidate("사무용 의자", 0, String::new(), rules).is_none());
        assert!(accept_candidate("사무용 의자", 10_000_001, String::new(), rules).is_none());
        // Normalizes to "의자 책" (4 chars): accepted. "[특가] 의자" normalizes to 2 chars.
        assert!(accept_candidate("★의자 책★", 5_000, String::new(), rules).is_some());
        assert!(accept_candidate("[특가] 의자", 5_000, String::new(), rules).is_none());
        assert!(accept_candidate("abcd", 5_000, String::new(), rules).is_some());
        assert!(accept_candidate("abc", 5_000, String::new(), rules).is_none());
    }

    #[test]
    fn accepted_name_is_normalized() {
        let profile = load_builtin_profile();
        let record =
            accept_candidate("[무료배송] 사무용 의자★★★", 129_000, String::new(), &profile.price)
                .expect("accepted");
        assert_eq!(record.name(), "사무용 의자");
    }

    #[test]
    fn five_nodes_three_valid_in_order() {
        let profile = load_builtin_profile();
        let doc = page(&[
            item("시디즈 T50 의자", "189,000", "/info/?pcode=1"),
            item("가격없는 상품 하나", "0", "/info/?pcode=2"),
            item("듀오백 Q1 체어", "99,000", "//prod.danawa.com/info/?pcode=3"),
            item("가격없는 상품 둘", "0", "/info/?pcode=4"),
            item("[무료배송] 에르고 체어★★", "259,000", "https://shop.example.com/5"),
        ]);
        let extraction = Assembler::new(&profile, BASE).assemble_page(&doc);

        let names: Vec<&str> = extraction.records.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["시디즈 T50 의자", "듀오백 Q1 체어", "에르고 체어"]);
        let urls: Vec<&str> = extraction.records.iter().map(|r| r.source_url()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.danawa.com/info/?pcode=1",
                "https://prod.danawa.com/info/?pcode=3",
                "https://shop.example.com/5",
            ]
        );
        assert_eq!(extraction.report.nodes_found, 5);
        assert_eq!(extraction.report.accepted, 3);
        assert_eq!(extraction.report.rejected, 2);
        assert_eq!(extraction.report.failed, 0);
        assert_eq!(extraction.report.selector.as_deref(), Some("ul.product_list li"));
        assert_eq!(extraction.report.title.as_deref(), Some("의자 : 다나와 통합검색"));
        assert!(!extraction.is_exhausted());
    }

    #[test]
    fn node_cap_bounds_examined_nodes() {
        let mut profile = load_builtin_profile();
        profile.max_nodes_per_page = 2;
        let items: Vec<String> = (0..5)
            .map(|i| item(&format!("모니터 암 {}", i), "30,000", "/x"))
            .collect();
        let extraction = Assembler::new(&profile, BASE).assemble_page(&page(&items));
        assert_eq!(extraction.records.len(), 2);
        assert_eq!(extraction.report.nodes_found, 5);
        assert_eq!(extraction.report.nodes_seen, 2);
    }

    #[test]
    fn record_cap_is_independent_of_node_cap() {
        let mut profile = load_builtin_profile();
        profile.max_records_per_page = 3;
        let items: Vec<String> = (0..10)
            .map(|i| item(&format!("키보드 모델 {}", i), "45,000", "/x"))
            .collect();
        let extraction = Assembler::new(&profile, BASE).assemble_page(&page(&items));
        assert_eq!(extraction.records.len(), 3);
        assert_eq!(extraction.report.nodes_seen, 3);
        assert_eq!(extraction.records[2].name(), "키보드 모델 2");
    }

    #[test]
    fn page_without_listings_is_exhausted() {
        let profile = load_builtin_profile();
        let doc = Html::parse_document(
            "<html><head><title>검색결과 없음</title></head><body><p>없음</p></body></html>",
        );
        let extraction = Assembler::new(&profile, BASE).assemble_page(&doc);
        assert!(extraction.is_exhausted());
        assert!(extraction.records.is_empty());
        assert_eq!(extraction.report.title.as_deref(), Some("검색결과 없음"));
    }

    #[test]
    fn boundary_contains_panics() {
        assert_eq!(within_boundary(|| 7), Some(7));
        let caught: Option<u32> = within_boundary(|| panic!("malformed node"));
        assert!(caught.is_none());
    }
}
