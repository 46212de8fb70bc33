// ABOUTME: Main library entry point for the listings crawler.
// ABOUTME: Re-exports the public API: Crawler, CrawlerBuilder, JobRegistry, ProgressHub, ProductRecord, CrawlError.

//! Listings scout - collects product listings from paginated search results.
//!
//! The crate fetches search result pages one at a time, locates the listing
//! nodes with ordered selector fallbacks, extracts and normalizes name, price
//! and link per node, and returns the accepted records in encounter order.
//! Jobs run on their own tasks and report progress to any number of
//! subscribers.
//!
//! # Example
//!
//! ```no_run
//! use listings_scout::{formats, Crawler, CrawlError, NoopMonitor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CrawlError> {
//!     let crawler = Crawler::builder().build()?;
//!     let records = crawler.crawl("사무용 의자", 2, &NoopMonitor).await?;
//!     let csv = formats::to_csv(&records)?;
//!     std::fs::write("results.csv", csv).expect("write results");
//!     Ok(())
//! }
//! ```

pub mod assemble;
pub mod crawl;
pub mod error;
pub mod extractors;
pub mod formats;
pub mod jobs;
pub mod normalize;
pub mod options;
pub mod progress;
pub mod resource;
pub mod result;

pub use crate::crawl::{CrawlMonitor, Crawler, NoopMonitor, PageOutcome, SkipReason};
pub use crate::error::{CrawlError, ErrorCode};
pub use crate::extractors::profile::{load_builtin_profile, SiteProfile};
pub use crate::formats::ExportFormat;
pub use crate::jobs::{JobRegistry, JobSnapshot, JobStatus};
pub use crate::options::{CrawlerBuilder, Options};
pub use crate::progress::{NoopSink, ProgressEvent, ProgressHub, ProgressSink, Subscription};
pub use crate::resource::{FetchResult, HttpFetcher, PageFetcher};
pub use crate::result::{PageExtraction, PageReport, ProductRecord};
