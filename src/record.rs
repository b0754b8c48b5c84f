//! Harvested record model and identity-key normalization.
//!
//! Every record carries the source that produced it and the resolved dork
//! that found it. Identity keys drive cross-source deduplication: contacts
//! collapse on the derived email, file links on a normalized URL.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::query::Query;

/// Which of the two harvest sources produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Api,
    Browser,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Api => "api",
            SourceTag::Browser => "browser",
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw result row from a search page, before any extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResultItem {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchResultItem {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: String::new(),
        }
    }
}

/// A person found in search results with an email derived from the
/// configured format rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub name: String,
    pub email: String,
    pub first: String,
    pub last: String,
    pub raw_title: String,
    pub source: SourceTag,
    pub origin_query: String,
}

/// A direct link to an exposed file surfaced by a dork.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLinkRecord {
    pub url: String,
    pub source: SourceTag,
    pub origin_query: String,
}

/// One deduplicated harvest finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HarvestRecord {
    Contact(ContactRecord),
    FileLink(FileLinkRecord),
}

impl HarvestRecord {
    /// Key under which this record deduplicates. Two records with the same
    /// key describe the same finding regardless of which source saw it.
    pub fn identity_key(&self) -> String {
        match self {
            HarvestRecord::Contact(c) => format!("contact:{}", c.email.to_lowercase()),
            HarvestRecord::FileLink(f) => {
                format!("file:{}", normalize_file_url(&f.url).unwrap_or_else(|| f.url.clone()))
            }
        }
    }

    pub fn source(&self) -> SourceTag {
        match self {
            HarvestRecord::Contact(c) => c.source,
            HarvestRecord::FileLink(f) => f.source,
        }
    }

    /// The primary payload: an email for contacts, a URL for file links.
    pub fn content(&self) -> &str {
        match self {
            HarvestRecord::Contact(c) => &c.email,
            HarvestRecord::FileLink(f) => &f.url,
        }
    }

    pub fn raw_title(&self) -> &str {
        match self {
            HarvestRecord::Contact(c) => &c.raw_title,
            HarvestRecord::FileLink(_) => "",
        }
    }

    pub fn origin_query(&self) -> &str {
        match self {
            HarvestRecord::Contact(c) => &c.origin_query,
            HarvestRecord::FileLink(f) => &f.origin_query,
        }
    }
}

/// Turns raw search items into harvest records (or discards them).
/// Contacts and files modes plug in different mappers; the orchestrator
/// stays agnostic of what is being harvested.
pub trait RecordMapper: Send + Sync {
    fn map(&self, item: &SearchResultItem, source: SourceTag, query: &Query) -> Option<HarvestRecord>;
}

/// Query-string parameters that vary per click without changing the target.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "mc_cid",
    "mc_eid",
    "ref",
];

/// Normalize a file URL for identity comparison: lowercase scheme and host,
/// keep the path, drop the fragment, strip tracking params but keep the
/// rest of the query string (an `?id=` can be load-bearing).
pub fn normalize_file_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_lowercase();
    let mut normalized = format!("{}://{}{}", url.scheme().to_lowercase(), host, url.path());
    let kept: Vec<String> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| {
            if v.is_empty() {
                k.into_owned()
            } else {
                format!("{}={}", k, v)
            }
        })
        .collect();
    if !kept.is_empty() {
        normalized.push('?');
        normalized.push_str(&kept.join("&"));
    }
    Some(normalized)
}

static FILE_EXT_AT_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.[a-z0-9]{2,5}$").expect("valid file extension pattern"));
static FILE_EXT_BEFORE_QUERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.[a-z0-9]{2,5}[?#]").expect("valid file extension pattern"));
static GOOGLE_REDIRECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&](?:q|url)=([^&]+)").expect("valid redirect pattern"));

/// Heuristic: does this URL point at a downloadable file rather than a page?
pub fn is_file_link(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    let path = match Url::parse(&lower) {
        Ok(u) => u.path().to_string(),
        Err(_) => return false,
    };
    if path.is_empty() || path.ends_with('/') {
        return false;
    }
    FILE_EXT_AT_END.is_match(&path) || FILE_EXT_BEFORE_QUERY.is_match(&lower)
}

/// Google result anchors are often wrapped in `/url?q=<target>` redirects.
/// Returns the unwrapped target, the URL itself if already absolute, or
/// None for relative junk.
pub fn unwrap_google_redirect(raw: &str) -> Option<String> {
    if raw.contains("/url?q=") || raw.contains("/url?url=") {
        if let Some(caps) = GOOGLE_REDIRECT.captures(raw) {
            let decoded = percent_decode(caps.get(1).map(|m| m.as_str()).unwrap_or(""));
            return Some(decoded);
        }
    }
    if raw.starts_with("http") {
        return Some(raw.to_string());
    }
    None
}

fn percent_decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .into_owned()
}
