//! Live browser driver: one headless Chrome session performing the same
//! queries via rendered search pages.
//!
//! The session is a mutual-exclusion resource — calls are serialized on an
//! internal lock, so at most one page fetch drives the tab at any time.
//! Before parsing, every rendered page is checked against an externally
//! supplied CAPTCHA predicate; a hit suspends the page (nothing parsed,
//! same page re-fetched after the operator acknowledges). A closed browser
//! window is a terminal `SessionEnded` signal, not an error.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::{FetchError, PageFetch, SourceDriver};
use crate::query::Query;
use crate::record::{SearchResultItem, SourceTag};

/// Pluggable page-level CAPTCHA detection. Provider-specific; the default
/// build scans the rendered HTML for configured marker substrings.
pub type CaptchaPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Build the default marker-substring predicate from config.
pub fn marker_predicate(markers: &[String]) -> CaptchaPredicate {
    let markers: Vec<String> = markers.iter().map(|m| m.to_lowercase()).collect();
    Arc::new(move |html: &str| {
        let lower = html.to_lowercase();
        markers.iter().any(|m| lower.contains(m.as_str()))
    })
}

// These selectors are compile-time constants; Selector::parse only fails on
// syntactically invalid CSS.
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").unwrap());
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static NEXT_PAGE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a#pnnext").unwrap());

/// Cookie-consent buttons dismissed before the first parse.
const CONSENT_SELECTORS: [&str; 2] = ["#L2AGLb", "button#W0wltc"];

pub struct BrowserDriver {
    // Keeps the Chrome process alive for the whole run.
    _browser: headless_chrome::Browser,
    tab: Arc<headless_chrome::Tab>,
    captcha: CaptchaPredicate,
    page_cap: u32,
    page_delay: Duration,
    session_dead: AtomicBool,
    // Serializes fetch_page calls against the single tab.
    call_lock: Mutex<()>,
}

impl BrowserDriver {
    /// Launch the run's single Chrome session. Disables the sandbox when
    /// running inside a container (detected via /.dockerenv or the
    /// SCRY_CONTAINER env var).
    pub fn launch(
        captcha: CaptchaPredicate,
        page_cap: u32,
        page_delay_secs: u64,
    ) -> anyhow::Result<Self> {
        let is_container =
            std::env::var("SCRY_CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists();

        let browser = if is_container {
            let options = headless_chrome::LaunchOptions::default_builder()
                .sandbox(false)
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to build Chrome launch options: {}", e))?;
            headless_chrome::Browser::new(options)
                .map_err(|e| anyhow::anyhow!("Failed to launch Chrome (container mode): {}", e))?
        } else {
            headless_chrome::Browser::default()
                .map_err(|e| anyhow::anyhow!("Failed to launch Chrome: {}", e))?
        };

        let tab = browser
            .new_tab()
            .map_err(|e| anyhow::anyhow!("Failed to open browser tab: {}", e))?;

        Ok(Self {
            _browser: browser,
            tab,
            captcha,
            page_cap,
            page_delay: Duration::from_secs(page_delay_secs),
            session_dead: AtomicBool::new(false),
            call_lock: Mutex::new(()),
        })
    }

    fn search_url(query: &Query, page_index: u32) -> String {
        let start = (page_index - 1) * 10;
        Url::parse_with_params(
            "https://www.google.com/search",
            &[("q", query.text.as_str()), ("start", &start.to_string())],
        )
        .map(|u| u.to_string())
        .unwrap_or_else(|_| "https://www.google.com/search".to_string())
    }

    /// Navigate and return the rendered HTML. Runs on the blocking pool
    /// because the Chrome client API is synchronous.
    async fn render_page(&self, url: String) -> Result<String, FetchError> {
        let tab = Arc::clone(&self.tab);
        let rendered = tokio::task::spawn_blocking(move || -> Result<String, String> {
            tab.navigate_to(&url).map_err(|e| e.to_string())?;
            tab.wait_until_navigated().map_err(|e| e.to_string())?;
            for sel in CONSENT_SELECTORS {
                if let Ok(button) = tab.find_element(sel) {
                    let _ = button.click();
                    std::thread::sleep(Duration::from_millis(500));
                    break;
                }
            }
            tab.get_content().map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| FetchError::Transient(format!("browser task failed: {}", e)))?;

        rendered.map_err(|message| {
            if session_closed(&message) {
                self.session_dead.store(true, Ordering::SeqCst);
                FetchError::Transient(message) // rewritten to SessionEnded by the caller
            } else {
                FetchError::Transient(message)
            }
        })
    }
}

#[async_trait]
impl SourceDriver for BrowserDriver {
    fn tag(&self) -> SourceTag {
        SourceTag::Browser
    }

    fn page_cap(&self) -> u32 {
        self.page_cap
    }

    async fn fetch_page(&self, query: &Query, page_index: u32) -> Result<PageFetch, FetchError> {
        let _guard = self.call_lock.lock().await;

        if self.session_dead.load(Ordering::SeqCst) {
            return Ok(PageFetch::SessionEnded);
        }

        if page_index > 1 {
            tokio::time::sleep(self.page_delay).await;
        }

        let url = Self::search_url(query, page_index);
        debug!(query = %query.text, page = page_index, "browser fetching page");

        let html = match self.render_page(url).await {
            Ok(html) => html,
            Err(_) if self.session_dead.load(Ordering::SeqCst) => {
                return Ok(PageFetch::SessionEnded);
            }
            Err(e) => return Err(e),
        };

        // Check for a challenge before touching the content. On a hit the
        // page is left unparsed so the resumed re-fetch sees a clean slate.
        if (self.captcha)(&html) {
            return Ok(PageFetch::CaptchaPending);
        }

        let (items, has_more) = parse_search_page(&html);
        Ok(PageFetch::Items { items, has_more })
    }
}

/// A closed window or dead DevTools connection surfaces as one of these
/// substrings in the client error message.
pub(crate) fn session_closed(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["has been closed", "target closed", "connection closed", "websocket", "channel closed"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Extract result items and the next-page signal from a rendered search
/// page. Titled results (h3 inside an anchor) come first; remaining
/// anchors are emitted untitled so file-link mapping still sees them.
pub(crate) fn parse_search_page(html: &str) -> (Vec<SearchResultItem>, bool) {
    let doc = Html::parse_document(html);
    let mut items = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for h3 in doc.select(&TITLE_SELECTOR) {
        let title: String = h3.text().collect::<String>().trim().to_string();
        let anchor = h3
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "a")
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string);
        if let (false, Some(href)) = (title.is_empty(), anchor) {
            if seen.insert(href.clone()) {
                items.push(SearchResultItem::new(title, href));
            }
        }
    }

    for anchor in doc.select(&ANCHOR_SELECTOR) {
        if let Some(href) = anchor.value().attr("href") {
            if seen.insert(href.to_string()) {
                items.push(SearchResultItem::new("", href));
            }
        }
    }

    let has_more = doc.select(&NEXT_PAGE_SELECTOR).next().is_some();
    (items, has_more)
}
