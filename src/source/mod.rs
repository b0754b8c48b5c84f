//! The two harvest sources behind one capability: fetch the next page of a
//! query. The orchestrator only ever talks to `SourceDriver`, so its logic
//! is source-agnostic and testable against stubs.

pub mod api;
pub mod browser;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::query::Query;
use crate::record::{SearchResultItem, SourceTag};

pub use api::ApiDriver;
pub use browser::BrowserDriver;

/// Outcome of one page fetch. The two non-item variants are signals, not
/// errors: `CaptchaPending` suspends the browser pass until a human acts,
/// `SessionEnded` terminates it while keeping everything gathered so far.
#[derive(Debug, Clone, PartialEq)]
pub enum PageFetch {
    Items {
        items: Vec<SearchResultItem>,
        /// Whether further pages likely exist. A short page means no.
        has_more: bool,
    },
    CaptchaPending,
    SessionEnded,
}

#[derive(Error, Debug)]
pub enum FetchError {
    /// Timeout or 5xx; retried inside the driver with bounded backoff
    /// before it ever surfaces here.
    #[error("transient network failure: {0}")]
    Transient(String),

    /// 401/403 from the search API. Not retryable; aborts this source's
    /// pass while preserving results gathered so far.
    #[error("search API rejected credentials: {0}")]
    Auth(String),

    /// Quota exhausted (429). Not retryable; in auto mode the run falls
    /// back to the remaining source.
    #[error("search API quota exhausted")]
    RateLimited,
}

#[async_trait]
pub trait SourceDriver: Send + Sync {
    fn tag(&self) -> SourceTag;

    /// Hard or soft ceiling on pages per query for this source.
    fn page_cap(&self) -> u32;

    /// Fetch one page of results for `query`. `page_index` is 1-based and
    /// never exceeds `page_cap()`.
    async fn fetch_page(&self, query: &Query, page_index: u32) -> Result<PageFetch, FetchError>;
}

/// Exponential backoff schedule for transient retry attempts (1-based).
pub(crate) fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let exp = attempt.saturating_sub(1).min(16);
    let delay = base_ms.saturating_mul(1u64 << exp);
    Duration::from_millis(delay.min(max_ms))
}
