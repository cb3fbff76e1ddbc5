use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use thiserror::Error;
use tracing::debug;

use crate::config::{FetchBackend, FetcherSettings};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("render backend failed for {url}: {message}")]
    Backend { url: String, message: String },
    #[error("no content returned for {url}")]
    Empty { url: String },
    #[error("fetcher misconfigured: {0}")]
    Config(String),
}

/// Anything that can turn a URL into rendered HTML.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

pub fn build(settings: &FetcherSettings) -> Result<Box<dyn PageFetcher>, FetchError> {
    Ok(match settings.backend {
        FetchBackend::Http => Box::new(HttpFetcher::new(settings)?),
        FetchBackend::Spider => Box::new(SpiderFetcher::new(settings)?),
    })
}

// ── Plain HTTP ──

/// Direct GET with browser-like headers. Works for server-rendered listings.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(settings: &FetcherSettings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        let ua = HeaderValue::from_str(&settings.user_agent)
            .map_err(|e| FetchError::Config(format!("user_agent: {e}")))?;
        headers.insert(USER_AGENT, ua);
        if let Some(referer) = &settings.referer {
            let value = HeaderValue::from_str(referer)
                .map_err(|e| FetchError::Config(format!("referer: {e}")))?;
            headers.insert(REFERER, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| FetchError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let start = Instant::now();
        let response = self.client.get(url).send().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        debug!(url, bytes = body.len(), latency_ms = start.elapsed().as_millis() as u64, "Fetched page");
        Ok(body)
    }
}

// ── spider.cloud ──

/// Headless rendering through spider.cloud, returning the raw rendered HTML.
pub struct SpiderFetcher {
    spider: Spider,
}

impl SpiderFetcher {
    pub fn new(settings: &FetcherSettings) -> Result<Self, FetchError> {
        let api_key = settings
            .spider_api_key
            .clone()
            .ok_or_else(|| FetchError::Config("fetcher.spider_api_key must be set".into()))?;
        let spider = Spider::new(Some(api_key))
            .map_err(|e| FetchError::Config(format!("failed to create Spider client: {e}")))?;
        Ok(Self { spider })
    }
}

#[async_trait]
impl PageFetcher for SpiderFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
            ..Default::default()
        };

        let start = Instant::now();
        let response = self
            .spider
            .scrape_url(url, Some(params), "application/json")
            .await
            .map_err(|e| FetchError::Backend {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let parsed: serde_json::Value = match response.as_str() {
            Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
            None => response,
        };
        let first = parsed.as_array().and_then(|arr| arr.first());

        if let Some(status) = first.and_then(|obj| obj.get("status")).and_then(|s| s.as_u64()) {
            if !(200..300).contains(&status) {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status as u16,
                });
            }
        }

        let content = first
            .and_then(|obj| obj.get("content"))
            .and_then(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| FetchError::Empty { url: url.to_string() })?;

        debug!(url, bytes = content.len(), latency_ms = start.elapsed().as_millis() as u64, "Rendered page");
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spider_requires_api_key() {
        let settings = FetcherSettings {
            backend: FetchBackend::Spider,
            ..Default::default()
        };
        assert!(matches!(build(&settings), Err(FetchError::Config(_))));
    }

    #[test]
    fn http_rejects_bad_header() {
        let settings = FetcherSettings {
            user_agent: "bad\nagent".into(),
            ..Default::default()
        };
        assert!(matches!(HttpFetcher::new(&settings), Err(FetchError::Config(_))));
    }

    #[test]
    fn http_backend_builds() {
        assert!(build(&FetcherSettings::default()).is_ok());
    }
}
