// ABOUTME: Listing locator: finds the product nodes on a search results page.
// ABOUTME: Tries listing selectors in priority order; the first selector with matches wins outright.

use scraper::{ElementRef, Html};

use crate::extractors::compiled::get_or_compile;

/// Product nodes found on a page together with the selector that found them.
#[derive(Debug)]
pub struct Located<'a> {
    pub selector: String,
    pub nodes: Vec<ElementRef<'a>>,
}

/// Returns the nodes of the first selector in `selectors` that matches anything.
///
/// No merging across selectors and no scoring. Invalid selectors are skipped.
/// Returns `None` when no selector matches, which the page loop reads as
/// "no more results".
pub fn locate_listings<'a>(doc: &'a Html, selectors: &[String]) -> Option<Located<'a>> {
    for css in selectors {
        let Some(selector) = get_or_compile(css) else {
            continue;
        };
        let nodes: Vec<ElementRef<'a>> = doc.select(&selector).collect();
        if !nodes.is_empty() {
            return Some(Located {
                selector: css.clone(),
                nodes,
            });
        }
    }
    None
}
