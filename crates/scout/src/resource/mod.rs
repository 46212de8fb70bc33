// ABOUTME: Resource fetching for search result pages: the PageFetcher seam and its reqwest implementation.
// ABOUTME: Handles per-request timeouts, content-length limits and charset decoding of the body.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CrawlError;

/// Maximum allowed content length (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// Result of one page fetch. Non-2xx responses are results too.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResult {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Raw body size in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Decode the body as UTF-8 text, using the content-type charset or detection.
    pub fn text_utf8(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

/// Decode body bytes to a String using charset from content-type header or detection.
pub(crate) fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(encoding) = content_type
        .and_then(extract_charset)
        .and_then(|charset| encoding_rs::Encoding::for_label(charset.as_bytes()))
    {
        let (decoded, _, _) = encoding.decode(body);
        return decoded.into_owned();
    }

    // Korean sites still serve EUC-KR now and then without a charset label.
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(Some(b"kr".as_slice()), true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extract charset value from Content-Type header.
pub(crate) fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .to_lowercase()
        .split(';')
        .find_map(|part| {
            part.trim()
                .strip_prefix("charset=")
                .map(|cs| cs.trim_matches('"').trim_matches('\'').to_string())
        })
        .filter(|cs| !cs.is_empty())
}

/// Source of search result pages.
///
/// The page loop only depends on this trait, so tests can substitute canned
/// pages or inject failures without a network.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Performs one GET of `url`.
    ///
    /// Transport failures are `Fetch` or `Timeout` errors; an unusable URL is
    /// `InvalidUrl`. Any HTTP status is returned as `Ok`.
    async fn fetch(&self, url: &str) -> Result<FetchResult, CrawlError>;
}

/// Builds the HTTP client used by [`HttpFetcher`].
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, CrawlError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .map_err(|e| {
            CrawlError::internal(
                "BuildClient",
                Some(anyhow::anyhow!("failed to build HTTP client: {}", e)),
            )
        })
}

/// [`PageFetcher`] backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    headers: HashMap<String, String>,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, headers: HashMap<String, String>) -> Self {
        Self { client, headers }
    }

    fn transport_error(url: &str, what: &str, e: reqwest::Error) -> CrawlError {
        if e.is_timeout() {
            CrawlError::timeout(url, "Fetch", Some(anyhow::anyhow!("{}: {}", what, e)))
        } else {
            CrawlError::fetch(url, "Fetch", Some(anyhow::anyhow!("{}: {}", what, e)))
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, CrawlError> {
        if url.is_empty() {
            return Err(CrawlError::invalid_url(url, "Fetch", None));
        }

        let parsed_url = url::Url::parse(url).map_err(|e| {
            CrawlError::invalid_url(url, "Fetch", Some(anyhow::anyhow!("invalid URL: {}", e)))
        })?;

        let scheme = parsed_url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(CrawlError::invalid_url(
                url,
                "Fetch",
                Some(anyhow::anyhow!("scheme must be http or https")),
            ));
        }

        let mut request = self.client.get(parsed_url);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::transport_error(url, "request failed", e))?;

        if let Some(len) = response.content_length() {
            if len as usize > MAX_CONTENT_LENGTH {
                return Err(CrawlError::fetch(
                    url,
                    "Fetch",
                    Some(anyhow::anyhow!("content too large")),
                ));
            }
        }

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_lowercase());

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::transport_error(url, "failed to read body", e))?;

        if body.len() > MAX_CONTENT_LENGTH {
            return Err(CrawlError::fetch(
                url,
                "Fetch",
                Some(anyhow::anyhow!("content too large")),
            ));
        }

        Ok(FetchResult {
            status,
            url: url.to_string(),
            final_url,
            content_type,
            body,
        })
    }
}
