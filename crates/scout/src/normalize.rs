// ABOUTME: Product name normalization: entity decoding, promotional tag stripping, whitespace collapse.
// ABOUTME: normalize_name() is pure and returns a fixed point of its cleaning pass.

use once_cell::sync::Lazy;
use regex::Regex;

/// Bracketed marketing tags such as `[무료배송]`, `[오늘특가]` or `[이벤트 진행중]`.
static PROMO_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[[^\]]*?(?:무료배송|특가|이벤트)[^\]]*?\]").expect("valid promo regex")
});

/// Runs of filled or hollow star glyphs.
static STAR_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[★☆]+").expect("valid star regex"));

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One cleaning pass: decode entities, strip promo tags and stars, collapse whitespace.
fn clean_pass(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let without_promo = PROMO_TAG_RE.replace_all(&decoded, "");
    let without_stars = STAR_RUN_RE.replace_all(&without_promo, "");
    collapse_whitespace(&without_stars)
}

/// Normalizes a raw product name extracted from a listing node.
///
/// Repeats the cleaning pass until the text stops changing, so normalizing
/// an already-normalized name returns it unchanged. A pass never lengthens
/// the text, so the loop terminates.
pub fn normalize_name(raw: &str) -> String {
    let mut current = clean_pass(raw);
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Number of characters (not bytes) in a string.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}
