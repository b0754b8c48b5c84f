//! Serper search API driver.
//!
//! Stateless across calls, so distinct queries may be fetched concurrently.
//! Every successful call consumes exactly one billable credit, counted on a
//! shared atomic so the run summary can report spend.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{backoff_delay, FetchError, PageFetch, SourceDriver};
use crate::config::SearchConfig;
use crate::query::{Query, API_PAGE_CAP};
use crate::record::{SearchResultItem, SourceTag};

pub const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

/// Serper returns at most this many organic results per page; a shorter
/// page means pagination is exhausted.
const FULL_PAGE: usize = 10;

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    sitelinks: Vec<SerperSitelink>,
}

#[derive(Debug, Deserialize)]
struct SerperSitelink {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
}

pub struct ApiDriver {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    credits: Arc<AtomicU64>,
    max_retries: u32,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
}

impl ApiDriver {
    pub fn new(api_key: String, search: &SearchConfig, user_agent: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            endpoint: SERPER_ENDPOINT.to_string(),
            api_key,
            credits: Arc::new(AtomicU64::new(0)),
            max_retries: search.max_retries,
            backoff_base_ms: search.backoff_base_delay_ms,
            backoff_max_ms: search.backoff_max_delay_ms,
        }
    }

    /// Point the driver at a different endpoint (tests use a local server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Shared credit counter, incremented once per successful page call.
    pub fn credit_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.credits)
    }

    pub fn credits_used(&self) -> u64 {
        self.credits.load(Ordering::Relaxed)
    }

    async fn request_page(&self, query: &Query, page_index: u32) -> Result<PageFetch, FetchError> {
        let mut payload = serde_json::json!({ "q": query.text, "num": FULL_PAGE });
        if page_index > 1 {
            payload["page"] = serde_json::json!(page_index);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::Auth(format!("HTTP {}", status.as_u16())));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Transient(format!("HTTP {}", status.as_u16())));
        }

        let body: SerperResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("malformed response body: {}", e)))?;

        // One credit per successful page call, short pages included.
        self.credits.fetch_add(1, Ordering::Relaxed);

        let organic_count = body.organic.len();
        let mut items = Vec::with_capacity(organic_count);
        for row in body.organic {
            let sitelinks = row.sitelinks;
            if !row.link.is_empty() || !row.title.is_empty() {
                items.push(SearchResultItem {
                    title: row.title,
                    url: row.link,
                    snippet: row.snippet,
                });
            }
            for sl in sitelinks {
                if !sl.link.is_empty() {
                    items.push(SearchResultItem {
                        title: sl.title,
                        url: sl.link,
                        snippet: String::new(),
                    });
                }
            }
        }

        debug!(
            query = %query.text,
            page = page_index,
            results = organic_count,
            "serper page fetched"
        );

        Ok(PageFetch::Items {
            items,
            has_more: organic_count >= FULL_PAGE,
        })
    }
}

#[async_trait]
impl SourceDriver for ApiDriver {
    fn tag(&self) -> SourceTag {
        SourceTag::Api
    }

    fn page_cap(&self) -> u32 {
        API_PAGE_CAP
    }

    async fn fetch_page(&self, query: &Query, page_index: u32) -> Result<PageFetch, FetchError> {
        debug_assert!(page_index >= 1 && page_index <= API_PAGE_CAP);
        let mut attempt = 0;
        loop {
            match self.request_page(query, page_index).await {
                Ok(page) => return Ok(page),
                Err(FetchError::Transient(reason)) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(query = %query.text, page = page_index, %reason, "retry budget exhausted");
                        return Err(FetchError::Transient(reason));
                    }
                    let delay = backoff_delay(attempt, self.backoff_base_ms, self.backoff_max_ms);
                    debug!(attempt, ?delay, %reason, "transient serper failure, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(other) => return Err(other),
            }
        }
    }
}
