// ABOUTME: Per-node field extractors for product name, price and detail link.
// ABOUTME: Each walks its ordered strategy table inside one listing node; first acceptable value wins.

//! Field extraction within a single listing node.
//!
//! Key behaviors:
//! - Selectors are tried in table order, and only the first element each
//!   selector matches is examined.
//! - Invalid selectors are skipped.
//! - Returned names are raw (not yet normalized); prices use 0 as the
//!   "no price" sentinel; links are resolved to absolute URLs or empty.

use scraper::ElementRef;

use crate::extractors::compiled::get_or_compile;
use crate::extractors::profile::{LinkStrategy, NameStrategy, PriceStrategy};
use crate::normalize::char_len;

/// Returns the first descendant of `node` matching `css`, if the selector is valid.
pub fn select_one<'a>(node: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = get_or_compile(css)?;
    let found = node.select(&selector).next();
    found
}

/// Concatenated, trimmed text content of an element.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Extracts the raw product name from a listing node.
///
/// For each candidate selector, prefers the element's visible text and falls
/// back to its title attribute when the text is too short. If no candidate
/// yields a name, optionally scans every hyperlink for a long text that does
/// not look like a price.
pub fn extract_name(node: ElementRef<'_>, strategy: &NameStrategy) -> Option<String> {
    for css in &strategy.selectors {
        let Some(el) = select_one(node, css) else {
            continue;
        };

        let text = element_text(el);
        if char_len(&text) > strategy.min_chars {
            return Some(text);
        }

        if let Some(title) = el.value().attr(&strategy.title_attr) {
            let title = title.trim();
            if char_len(title) > strategy.min_chars {
                return Some(title.to_string());
            }
        }
    }

    let scan = strategy.link_scan.as_ref()?;
    let selector = get_or_compile(&scan.selector)?;
    let found = node
        .select(&selector)
        .map(element_text)
        .find(|text| char_len(text) > scan.min_chars && !text.contains(scan.exclude.as_str()));
    found
}

/// Parses the digits of `text` as a price, applying the digit-count and range checks.
fn price_from_digits(text: &str, strategy: &PriceStrategy) -> Option<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < strategy.min_digits {
        return None;
    }
    // Overflowing digit strings are far outside any sane range anyway.
    let value = digits.parse::<u64>().ok()?;
    strategy.in_range(value).then_some(value)
}

/// Extracts the price from a listing node, or 0 when nothing acceptable is found.
///
/// Candidate elements have all non-digit characters stripped before parsing.
/// Failing that, the node's full text is scanned for numbers immediately
/// followed by the currency marker and the first in-range value is used.
pub fn extract_price(node: ElementRef<'_>, strategy: &PriceStrategy) -> u64 {
    for css in &strategy.selectors {
        if let Some(el) = select_one(node, css) {
            let text: String = el.text().collect();
            if let Some(price) = price_from_digits(&text, strategy) {
                return price;
            }
        }
    }

    let Some(re) = strategy.marker_regex() else {
        return 0;
    };
    let full_text: String = node.text().collect();
    let price = re
        .captures_iter(&full_text)
        .filter_map(|caps| caps[1].replace(',', "").parse::<u64>().ok())
        .find(|value| strategy.in_range(*value));
    price.unwrap_or(0)
}

/// Resolves a link target against the site origin.
///
/// - `//host/path` gets an explicit `https:` scheme.
/// - `/path` gets `base_origin` prepended.
/// - Anything else (already absolute, or relative without a leading slash) passes through.
pub fn resolve_link(href: &str, base_origin: &str) -> String {
    if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("{}{}", base_origin.trim_end_matches('/'), href)
    } else {
        href.to_string()
    }
}

/// Extracts the detail page link from a listing node, or an empty string.
pub fn extract_link(node: ElementRef<'_>, strategy: &LinkStrategy, base_origin: &str) -> String {
    for css in &strategy.selectors {
        let Some(el) = select_one(node, css) else {
            continue;
        };
        if let Some(href) = el.value().attr(&strategy.attr) {
            let href = href.trim();
            if !href.is_empty() {
                return resolve_link(href, base_origin);
            }
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::profile::load_builtin_profile;
    use pretty_assertions::assert_eq;
    use scraper::{Html, Selector};

    const BASE: &str = "https://www.danawa.com";

    fn first_li(doc: &Html) -> ElementRef<'_> {
        let sel = Selector::parse("li").unwrap();
        doc.select(&sel).next().expect("fixture has an li")
    }

    fn fragment(inner: &str) -> Html {
        Html::parse_document(&format!("<html><body><ul><li>{}</li></ul></body></html>", inner))
    }

    #[test]
    fn name_prefers_first_selector_text() {
        let profile = load_builtin_profile();
        let doc = fragment(
            r#"<p class="prod_name"><a href="/p/1">시디즈 T50 의자</a></p>
               <h3><a>다른 이름의 상품입니다</a></h3>"#,
        );
        let name = extract_name(first_li(&doc), &profile.product_name);
        assert_eq!(name.as_deref(), Some("시디즈 T50 의자"));
    }

    #[test]
    fn name_falls_back_to_title_attr_when_text_short() {
        let profile = load_builtin_profile();
        let doc = fragment(r#"<a class="prod_name" title="듀오백 Q1 체어">Q1</a>"#);
        let name = extract_name(first_li(&doc), &profile.product_name);
        assert_eq!(name.as_deref(), Some("듀오백 Q1 체어"));
    }

    #[test]
    fn name_moves_to_next_selector_when_text_and_title_short() {
        let profile = load_builtin_profile();
        let doc = fragment(
            r#"<p class="prod_name"><a>abc</a></p>
               <div class="item_name"><a>Herman Miller Aeron</a></div>"#,
        );
        let name = extract_name(first_li(&doc), &profile.product_name);
        assert_eq!(name.as_deref(), Some("Herman Miller Aeron"));
    }

    #[test]
    fn name_link_scan_skips_price_like_text() {
        let profile = load_builtin_profile();
        let doc = fragment(
            r#"<a>129,000원 최저가 보기</a>
               <a>짧음</a>
               <a>에르고휴먼 엔진 메쉬 의자</a>"#,
        );
        let name = extract_name(first_li(&doc), &profile.product_name);
        assert_eq!(name.as_deref(), Some("에르고휴먼 엔진 메쉬 의자"));
    }

    #[test]
    fn name_none_when_nothing_matches() {
        let profile = load_builtin_profile();
        let doc = fragment(r#"<span>no links here</span>"#);
        assert!(extract_name(first_li(&doc), &profile.product_name).is_none());
    }

    #[test]
    fn price_strips_non_digits() {
        let profile = load_builtin_profile();
        let doc = fragment(r#"<p class="price_sect"><strong>129,000</strong>원</p>"#);
        assert_eq!(extract_price(first_li(&doc), &profile.price), 129_000);
    }

    #[test]
    fn price_out_of_range_candidate_is_skipped() {
        let profile = load_builtin_profile();
        let doc = fragment(
            r#"<strong class="num">500</strong>
               <span class="price">999,999</span>"#,
        );
        assert_eq!(extract_price(first_li(&doc), &profile.price), 999_999);
    }

    #[test]
    fn price_rejects_short_digit_strings() {
        let profile = load_builtin_profile();
        let doc = fragment(r#"<strong class="num">12</strong>"#);
        assert_eq!(extract_price(first_li(&doc), &profile.price), 0);
    }

    #[test]
    fn price_overflowing_digits_are_ignored() {
        let profile = load_builtin_profile();
        let doc = fragment(r#"<strong class="num">99999999999999999999999999</strong>"#);
        assert_eq!(extract_price(first_li(&doc), &profile.price), 0);
    }

    #[test]
    fn price_falls_back_to_currency_marker_scan() {
        let profile = load_builtin_profile();
        let doc = fragment(r#"<div>배송비 500원 / 판매가 45,900 원</div>"#);
        assert_eq!(extract_price(first_li(&doc), &profile.price), 45_900);
    }

    #[test]
    fn price_zero_when_absent() {
        let profile = load_builtin_profile();
        let doc = fragment(r#"<div>가격 문의</div>"#);
        assert_eq!(extract_price(first_li(&doc), &profile.price), 0);
    }

    #[test]
    fn resolve_link_variants() {
        assert_eq!(
            resolve_link("//img.example.com/a", BASE),
            "https://img.example.com/a"
        );
        assert_eq!(resolve_link("/item/1", BASE), "https://www.danawa.com/item/1");
        assert_eq!(resolve_link("https://x.com/y", BASE), "https://x.com/y");
        assert_eq!(
            resolve_link("/item/1", "https://www.danawa.com/"),
            "https://www.danawa.com/item/1"
        );
    }

    #[test]
    fn link_uses_first_non_empty_href() {
        let profile = load_builtin_profile();
        let doc = fragment(
            r#"<p class="prod_name"><a href="">empty</a></p>
               <a class="prod_name" href="//prod.danawa.com/info/?pcode=1">x</a>"#,
        );
        assert_eq!(
            extract_link(first_li(&doc), &profile.link, BASE),
            "https://prod.danawa.com/info/?pcode=1"
        );
    }

    #[test]
    fn link_empty_when_missing() {
        let profile = load_builtin_profile();
        let doc = fragment(r#"<span>nothing</span>"#);
        assert_eq!(extract_link(first_li(&doc), &profile.link, BASE), "");
    }
}
