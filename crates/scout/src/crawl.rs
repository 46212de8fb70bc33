// ABOUTME: The Crawler and its page fetch loop: request, decode, extract, then advance or halt.
// ABOUTME: Transient page failures skip the page; anything else aborts the crawl with no partial results.

//! Page fetch loop.
//!
//! One crawl is one sequential future. Each page turn resolves to a
//! [`PageOutcome`]:
//! - `Skipped`: non-success status, a body too small to be a results page, or
//!   a transport failure. The loop moves on to the next page.
//! - `Exhausted`: the page has no listing nodes. The loop halts with what it has.
//! - `Extracted`: records are appended in page order.
//!
//! A randomized pause separates consecutive page requests. Extraction is
//! synchronous and the parsed document never lives across an await point.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::assemble::Assembler;
use crate::error::CrawlError;
use crate::options::{CrawlerBuilder, Options};
use crate::resource::PageFetcher;
use crate::result::{PageExtraction, PageReport, ProductRecord};

/// Fixed query parameters of the search endpoint, in request order.
const SEARCH_PARAMS: &[(&str, &str)] = &[
    ("sort", "opinionDESC"),
    ("list", "list"),
    ("boost", "true"),
    ("limit", "40"),
    ("mode", "simple"),
];

/// Observer of a running crawl.
///
/// Callbacks are synchronous and must not block; the job registry uses them
/// to update counters and fan out progress events.
pub trait CrawlMonitor: Send + Sync {
    /// Human-readable status line.
    fn message(&self, _text: &str) {}

    /// A page turn is starting.
    fn page_started(&self, _page: u32, _max_pages: u32) {}

    /// A page turn finished; `total_records` counts all records so far.
    fn page_finished(&self, _page: u32, _max_pages: u32, _total_records: usize) {}
}

/// Monitor that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl CrawlMonitor for NoopMonitor {}

/// Why a page was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Non-success HTTP status
    Status(u16),
    /// Decoded body shorter than the configured minimum
    BodyTooSmall(usize),
    /// Connect failure, timeout or body read failure
    Transport(String),
}

/// Result of one page turn.
#[derive(Debug)]
pub enum PageOutcome {
    Skipped(SkipReason),
    Exhausted(PageReport),
    Extracted(PageExtraction),
}

/// Draws the inter-page pause uniformly from `[min, max]`.
fn pick_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

/// Crawls search result pages for a keyword and assembles product records.
pub struct Crawler {
    opts: Options,
    fetcher: Arc<dyn PageFetcher>,
}

impl fmt::Debug for Crawler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crawler")
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl Crawler {
    /// Create a new CrawlerBuilder for configuring the crawler.
    pub fn builder() -> CrawlerBuilder {
        CrawlerBuilder::new()
    }

    pub(crate) fn new(opts: Options, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { opts, fetcher }
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Builds the search URL for `keyword` and 1-based `page`.
    pub fn page_url(&self, keyword: &str, page: u32) -> Result<String, CrawlError> {
        let mut url = url::Url::parse(&self.opts.endpoint).map_err(|e| {
            CrawlError::invalid_url(
                self.opts.endpoint.as_str(),
                "PageUrl",
                Some(anyhow::anyhow!("{}", e)),
            )
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", keyword);
            for (key, value) in SEARCH_PARAMS {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("page", &page.to_string());
        }
        Ok(url.into())
    }

    /// Parses a results page and assembles its records.
    pub fn extract_page(&self, html: &str) -> PageExtraction {
        let doc = Html::parse_document(html);
        Assembler::new(&self.opts.profile, &self.opts.base_origin).assemble_page(&doc)
    }

    /// Performs one page turn.
    ///
    /// Returns `Err` only for failures that should abort the whole crawl.
    pub async fn visit_page(
        &self,
        keyword: &str,
        page: u32,
        monitor: &dyn CrawlMonitor,
    ) -> Result<PageOutcome, CrawlError> {
        let url = self.page_url(keyword, page)?;

        monitor.message(&format!("{}페이지 요청 중...", page));
        debug!(page, url = %url, "requesting page");

        let fetched = match self.fetcher.fetch(&url).await {
            Ok(fetched) => fetched,
            Err(e) if e.is_transient() => {
                warn!(page, error = %e, "page request failed, skipping");
                monitor.message(&format!("{}페이지 오류: {}", page, e));
                return Ok(PageOutcome::Skipped(SkipReason::Transport(e.to_string())));
            }
            Err(e) => return Err(e),
        };

        monitor.message(&format!("응답 수신: {}", fetched.status));
        if !fetched.is_success() {
            warn!(page, status = fetched.status, "non-success status, skipping");
            monitor.message(&format!("HTTP 오류: {}", fetched.status));
            return Ok(PageOutcome::Skipped(SkipReason::Status(fetched.status)));
        }

        monitor.message("HTML 내용 분석 중...");
        let html = fetched.text_utf8();
        monitor.message(&format!("HTML 크기: {} 바이트", html.len()));
        if html.len() < self.opts.min_body_bytes {
            warn!(page, bytes = html.len(), "body too small, possibly blocked");
            monitor.message("HTML이 너무 작음 - 차단되었을 가능성");
            return Ok(PageOutcome::Skipped(SkipReason::BodyTooSmall(html.len())));
        }

        monitor.message("상품 정보 추출 중...");
        let extraction = self.extract_page(&html);
        let report = &extraction.report;
        debug!(
            page,
            selector = report.selector.as_deref().unwrap_or("-"),
            nodes = report.nodes_found,
            accepted = report.accepted,
            rejected = report.rejected,
            failed = report.failed,
            "page extracted"
        );

        if extraction.is_exhausted() {
            monitor.message(&format!("{}페이지에서 상품을 찾을 수 없습니다.", page));
            if let Some(title) = &extraction.report.title {
                let title: String = title.chars().take(50).collect();
                monitor.message(&format!("페이지 제목: {}", title));
            }
            return Ok(PageOutcome::Exhausted(extraction.report));
        }

        monitor.message(&format!(
            "{}페이지: {}개 상품 발견",
            page,
            extraction.records.len()
        ));
        Ok(PageOutcome::Extracted(extraction))
    }

    /// Crawls up to `max_pages` pages for `keyword`.
    ///
    /// Records are returned in page order, then in-page order, duplicates
    /// included. The result may be empty. Any error aborts the crawl and no
    /// partial results are returned.
    pub async fn crawl(
        &self,
        keyword: &str,
        max_pages: u32,
        monitor: &dyn CrawlMonitor,
    ) -> Result<Vec<ProductRecord>, CrawlError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(CrawlError::invalid_input(
                "Crawl",
                Some(anyhow::anyhow!("keyword is empty")),
            ));
        }
        if max_pages == 0 {
            return Err(CrawlError::invalid_input(
                "Crawl",
                Some(anyhow::anyhow!("page count must be at least 1")),
            ));
        }

        info!(keyword, max_pages, "crawl started");
        let mut records: Vec<ProductRecord> = Vec::new();

        for page in 1..=max_pages {
            monitor.page_started(page, max_pages);
            monitor.message(&format!("{}페이지 접속 준비 중...", page));

            let outcome = self.visit_page(keyword, page, monitor).await?;
            let halt = match outcome {
                PageOutcome::Extracted(extraction) => {
                    records.extend(extraction.records);
                    false
                }
                PageOutcome::Exhausted(_) => {
                    info!(page, "no listings, stopping early");
                    true
                }
                PageOutcome::Skipped(reason) => {
                    debug!(page, ?reason, "page skipped");
                    false
                }
            };
            monitor.page_finished(page, max_pages, records.len());

            if halt {
                break;
            }
            if page < max_pages {
                let delay = pick_delay(self.opts.delay_min, self.opts.delay_max);
                monitor.message("다음 페이지 대기 중...");
                debug!(delay_ms = delay.as_millis() as u64, "pausing before next page");
                tokio::time::sleep(delay).await;
            }
        }

        info!(keyword, records = records.len(), "crawl finished");
        Ok(records)
    }
}
