// ABOUTME: Configuration options for the crawler including Options and the CrawlerBuilder.
// ABOUTME: CrawlerBuilder provides a fluent API for constructing Crawler instances with custom settings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::crawl::Crawler;
use crate::error::CrawlError;
use crate::extractors::profile::{load_builtin_profile, SiteProfile};
use crate::resource::{build_http_client, HttpFetcher, PageFetcher};

/// Default search results endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://search.danawa.com/dsearch.php";

/// Default origin for resolving root-relative product links.
pub const DEFAULT_BASE_ORIGIN: &str = "https://www.danawa.com";

/// Desktop Chrome user agent sent by default.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Browser-like request headers sent with every page request.
///
/// Accept-Encoding is left to reqwest, which only advertises what it can decode.
fn default_headers() -> HashMap<String, String> {
    [
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        ),
        ("Accept-Language", "ko-KR,ko;q=0.9,en;q=0.8"),
        ("DNT", "1"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Configuration options for the crawler.
#[derive(Clone)]
pub struct Options {
    /// Per-request timeout
    pub timeout: Duration,
    pub user_agent: String,
    pub headers: HashMap<String, String>,
    pub http_client: Option<reqwest::Client>,
    /// Search endpoint that receives the query parameters
    pub endpoint: String,
    /// Origin prepended to root-relative links
    pub base_origin: String,
    pub profile: SiteProfile,
    /// Lower bound of the randomized pause between pages
    pub delay_min: Duration,
    /// Upper bound of the randomized pause between pages
    pub delay_max: Duration,
    /// Decoded bodies shorter than this are treated as block pages
    pub min_body_bytes: usize,
    /// Replaces the HTTP fetcher entirely when set
    pub fetcher: Option<Arc<dyn PageFetcher>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: default_headers(),
            http_client: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            base_origin: DEFAULT_BASE_ORIGIN.to_string(),
            profile: load_builtin_profile(),
            delay_min: Duration::from_secs(3),
            delay_max: Duration::from_secs(6),
            min_body_bytes: 1000,
            fetcher: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("endpoint", &self.endpoint)
            .field("base_origin", &self.base_origin)
            .field("profile", &self.profile.site)
            .field("delay_min", &self.delay_min)
            .field("delay_max", &self.delay_max)
            .field("min_body_bytes", &self.min_body_bytes)
            .field("custom_fetcher", &self.fetcher.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for constructing Crawler instances with custom configuration.
#[derive(Debug, Clone)]
pub struct CrawlerBuilder {
    opts: Options,
}

impl CrawlerBuilder {
    /// Create a new CrawlerBuilder with default options.
    pub fn new() -> Self {
        Self {
            opts: Options::default(),
        }
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Add or replace a header sent with every request.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Use a custom HTTP client. Timeout and user agent are then the client's own.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Set the search endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.opts.endpoint = endpoint.into();
        self
    }

    /// Set the origin used to resolve root-relative links.
    pub fn base_origin(mut self, base_origin: impl Into<String>) -> Self {
        self.opts.base_origin = base_origin.into();
        self
    }

    /// Use a custom site profile.
    pub fn profile(mut self, profile: SiteProfile) -> Self {
        self.opts.profile = profile;
        self
    }

    /// Set the inclusive range the inter-page pause is drawn from.
    pub fn delay(mut self, min: Duration, max: Duration) -> Self {
        self.opts.delay_min = min;
        self.opts.delay_max = max;
        self
    }

    /// Set the minimum decoded body size for a page to be parsed.
    pub fn min_body_bytes(mut self, bytes: usize) -> Self {
        self.opts.min_body_bytes = bytes;
        self
    }

    /// Use a custom page fetcher instead of HTTP.
    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.opts.fetcher = Some(fetcher);
        self
    }

    /// Build the Crawler with the configured options.
    ///
    /// Fails if the endpoint or base origin is not an http(s) URL, the delay
    /// range is inverted, or the HTTP client cannot be constructed.
    pub fn build(self) -> Result<Crawler, CrawlError> {
        let opts = self.opts;

        for (op, value) in [("Endpoint", &opts.endpoint), ("BaseOrigin", &opts.base_origin)] {
            let parsed = url::Url::parse(value).map_err(|e| {
                CrawlError::invalid_url(value.as_str(), op, Some(anyhow::anyhow!("{}", e)))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(CrawlError::invalid_url(
                    value.as_str(),
                    op,
                    Some(anyhow::anyhow!("scheme must be http or https")),
                ));
            }
        }

        if opts.delay_min > opts.delay_max {
            return Err(CrawlError::invalid_input(
                "Delay",
                Some(anyhow::anyhow!(
                    "delay min {:?} exceeds max {:?}",
                    opts.delay_min,
                    opts.delay_max
                )),
            ));
        }

        let fetcher: Arc<dyn PageFetcher> = match &opts.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => {
                let client = match &opts.http_client {
                    Some(client) => client.clone(),
                    None => build_http_client(&opts.user_agent, opts.timeout)?,
                };
                Arc::new(HttpFetcher::new(client, opts.headers.clone()))
            }
        };

        Ok(Crawler::new(opts, fetcher))
    }
}

impl Default for CrawlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
