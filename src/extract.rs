//! Name extraction from search result titles/URLs and email derivation.
//!
//! Extraction is source-aware: LinkedIn, RocketReach and ZoomInfo titles
//! each follow a known "Name - Role" layout, and LinkedIn profile slugs
//! encode the name a second time. Everything else falls back to a
//! conservative generic pattern. The email-format rule is a numbered
//! policy selected per run, matching common corporate conventions.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::query::Query;
use crate::record::{
    is_file_link, unwrap_google_redirect, ContactRecord, FileLinkRecord, HarvestRecord,
    RecordMapper, SearchResultItem, SourceTag,
};

/// Tokens that look like name parts but are titles, fillers or role words.
static TITLE_NOISE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "dr", "mr", "mrs", "ms", "prof", "sir", "phd", "cpa", "cfa", "the", "and", "for", "with",
        "from", "about", "into", "top", "best", "new", "old", "bad", "good", "big", "open", "all",
        "any", "how", "why", "who", "what", "our", "you", "security", "cyber", "cloud", "data",
        "team", "lead", "senior", "junior", "staff", "chief", "head", "vice", "mad", "pro", "iii",
        "inc", "llc", "ltd",
    ]
    .into_iter()
    .collect()
});

static NAME_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-–—|]").expect("valid split pattern"));
static NON_ALPHA_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z\s]").expect("valid filter pattern"));
static LINKEDIN_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)linkedin\.com/in/([a-zA-Z]+-[a-zA-Z]+-?)").expect("valid slug pattern"));

/// Email formats 1-10, matching the numbering advertised in the CLI help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailFormat {
    FirstDotLast = 1,
    FirstLast = 2,
    FLast = 3,
    First = 4,
    Last = 5,
    LastDotFirst = 6,
    FirstUnderscoreLast = 7,
    FDotLast = 8,
    FirstL = 9,
    FirstDotLastOne = 10,
}

impl EmailFormat {
    pub const HELP: &'static str = "1=first.last  2=firstlast  3=flast  4=first  5=last  \
                                    6=last.first  7=first_last  8=f.last  9=firstl  10=first.last1";

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::FirstDotLast),
            2 => Some(Self::FirstLast),
            3 => Some(Self::FLast),
            4 => Some(Self::First),
            5 => Some(Self::Last),
            6 => Some(Self::LastDotFirst),
            7 => Some(Self::FirstUnderscoreLast),
            8 => Some(Self::FDotLast),
            9 => Some(Self::FirstL),
            10 => Some(Self::FirstDotLastOne),
            _ => None,
        }
    }

    /// Build an address from already-normalized lowercase name tokens.
    pub fn apply(&self, first: &str, last: &str, domain: &str) -> Option<String> {
        let f_initial = first.chars().next()?;
        let l_initial = last.chars().next()?;
        let local = match self {
            Self::FirstDotLast => format!("{}.{}", first, last),
            Self::FirstLast => format!("{}{}", first, last),
            Self::FLast => format!("{}{}", f_initial, last),
            Self::First => first.to_string(),
            Self::Last => last.to_string(),
            Self::LastDotFirst => format!("{}.{}", last, first),
            Self::FirstUnderscoreLast => format!("{}_{}", first, last),
            Self::FDotLast => format!("{}.{}", f_initial, last),
            Self::FirstL => format!("{}{}", first, l_initial),
            Self::FirstDotLastOne => format!("{}.{}1", first, last),
        };
        Some(format!("{}@{}", local, domain))
    }
}

/// A first/last pair pulled out of a result, lowercase ascii letters only.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedName {
    pub first: String,
    pub last: String,
}

fn clean_token(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase()
}

fn accept(first: &str, last: &str) -> Option<ExtractedName> {
    let first = clean_token(first);
    let last = clean_token(last);
    if first.len() < 2 || last.len() < 2 {
        return None;
    }
    if TITLE_NOISE.contains(first.as_str()) || TITLE_NOISE.contains(last.as_str()) {
        return None;
    }
    Some(ExtractedName { first, last })
}

/// "FirstName LastName - Role at Company | Site" titles.
fn from_title_prefix(title: &str, max_tokens: usize) -> Option<ExtractedName> {
    let head = NAME_SPLIT.splitn(title, 2).next().unwrap_or("");
    let name_part = NON_ALPHA_SPACE.replace_all(head, "");
    let tokens: Vec<&str> = name_part.split_whitespace().collect();
    if tokens.len() < 2 || tokens.len() > max_tokens {
        return None;
    }
    accept(tokens[0], tokens[tokens.len() - 1])
}

/// LinkedIn profile URLs carry the name in the slug:
/// linkedin.com/in/firstname-lastname-hexid
fn from_linkedin_slug(url: &str) -> Option<ExtractedName> {
    let caps = LINKEDIN_SLUG.captures(url)?;
    let slug = caps.get(1)?.as_str().trim_end_matches('-');
    let mut parts = slug.split('-');
    let first = parts.next()?;
    let last = parts.next()?;
    if first.len() < 2 || last.len() < 2 {
        return None;
    }
    accept(first, last)
}

/// Source-aware extraction from one search result.
pub fn extract_name(item: &SearchResultItem) -> Option<ExtractedName> {
    let link_lower = item.url.to_lowercase();

    if link_lower.contains("linkedin.com/in/") {
        return from_title_prefix(&item.title, usize::MAX).or_else(|| from_linkedin_slug(&item.url));
    }
    if link_lower.contains("rocketreach.co") {
        return from_title_prefix(&item.title, usize::MAX);
    }
    if link_lower.contains("zoominfo.com") {
        let lower = item.title.to_lowercase();
        // Company overview pages share the layout but carry no person.
        if lower.contains("overview") || lower.contains("company") {
            return None;
        }
        return from_title_prefix(&item.title, usize::MAX);
    }
    // Generic: only extract when the title clearly reads "Name - Role".
    if NAME_SPLIT.splitn(&item.title, 2).count() >= 2 {
        return from_title_prefix(&item.title, 4);
    }
    None
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Maps search results to `ContactRecord`s for the harvest store.
pub struct ContactMapper {
    domain: String,
    format: EmailFormat,
}

impl ContactMapper {
    pub fn new(domain: impl Into<String>, format: EmailFormat) -> Self {
        Self {
            domain: domain.into(),
            format,
        }
    }
}

impl RecordMapper for ContactMapper {
    fn map(&self, item: &SearchResultItem, source: SourceTag, query: &Query) -> Option<HarvestRecord> {
        let name = extract_name(item)?;
        let email = self.format.apply(&name.first, &name.last, &self.domain)?;
        Some(HarvestRecord::Contact(ContactRecord {
            name: format!("{} {}", title_case(&name.first), title_case(&name.last)),
            email,
            first: name.first,
            last: name.last,
            raw_title: item.title.clone(),
            source,
            origin_query: query.text.clone(),
        }))
    }
}

/// Maps search results to `FileLinkRecord`s, unwrapping redirect URLs and
/// discarding anything that does not look like a direct file link.
pub struct FileLinkMapper;

impl RecordMapper for FileLinkMapper {
    fn map(&self, item: &SearchResultItem, source: SourceTag, query: &Query) -> Option<HarvestRecord> {
        let target = unwrap_google_redirect(&item.url)?;
        if !is_file_link(&target) {
            return None;
        }
        Some(HarvestRecord::FileLink(FileLinkRecord {
            url: target,
            source,
            origin_query: query.dork_id.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, url: &str) -> SearchResultItem {
        SearchResultItem::new(title, url)
    }

    #[test]
    fn linkedin_title_extraction() {
        let n = extract_name(&item(
            "John Doe - Security Engineer at Acme | LinkedIn",
            "https://www.linkedin.com/in/john-doe-1a2b3c",
        ))
        .unwrap();
        assert_eq!(n.first, "john");
        assert_eq!(n.last, "doe");
    }

    #[test]
    fn linkedin_slug_fallback_when_title_is_useless() {
        let n = extract_name(&item(
            "LinkedIn",
            "https://www.linkedin.com/in/jane-roe-9f8e7d",
        ))
        .unwrap();
        assert_eq!(n.first, "jane");
        assert_eq!(n.last, "roe");
    }

    #[test]
    fn zoominfo_company_pages_rejected() {
        assert!(extract_name(&item(
            "Acme Corp - Company Overview - ZoomInfo",
            "https://www.zoominfo.com/c/acme/123",
        ))
        .is_none());
    }

    #[test]
    fn noise_tokens_rejected() {
        assert!(extract_name(&item(
            "Senior Lead - hiring now",
            "https://www.linkedin.com/in/senior-lead",
        ))
        .is_none());
    }

    #[test]
    fn generic_title_needs_clear_name_role_shape() {
        let n = extract_name(&item(
            "Mary Major - Head of Finance",
            "https://people.example.com/profile/42",
        ))
        .unwrap();
        assert_eq!((n.first.as_str(), n.last.as_str()), ("mary", "major"));
        assert!(extract_name(&item("Ten tools every engineer should know", "https://blog.example.com/post")).is_none());
    }

    #[test]
    fn email_format_table() {
        let cases: [(u8, &str); 10] = [
            (1, "john.doe@acme.com"),
            (2, "johndoe@acme.com"),
            (3, "jdoe@acme.com"),
            (4, "john@acme.com"),
            (5, "doe@acme.com"),
            (6, "doe.john@acme.com"),
            (7, "john_doe@acme.com"),
            (8, "j.doe@acme.com"),
            (9, "johnd@acme.com"),
            (10, "john.doe1@acme.com"),
        ];
        for (id, expected) in cases {
            let fmt = EmailFormat::from_id(id).unwrap();
            assert_eq!(fmt.apply("john", "doe", "acme.com").as_deref(), Some(expected));
        }
        assert!(EmailFormat::from_id(11).is_none());
    }

    #[test]
    fn contact_mapper_builds_record_with_derived_email() {
        let mapper = ContactMapper::new("acme.com", EmailFormat::FirstDotLast);
        let query = Query::new("dork", "site:linkedin.com/in/ \"Acme\"", 10);
        let record = mapper
            .map(
                &item("John Doe - CTO at Acme | LinkedIn", "https://linkedin.com/in/john-doe"),
                SourceTag::Api,
                &query,
            )
            .unwrap();
        match record {
            HarvestRecord::Contact(c) => {
                assert_eq!(c.email, "john.doe@acme.com");
                assert_eq!(c.name, "John Doe");
                assert_eq!(c.source, SourceTag::Api);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn file_mapper_filters_non_files_and_unwraps_redirects() {
        let mapper = FileLinkMapper;
        let query = Query::new("site:{domain} filetype:pdf", "site:acme.com filetype:pdf", 10);
        assert!(mapper
            .map(&item("About", "https://acme.com/about"), SourceTag::Browser, &query)
            .is_none());
        let record = mapper
            .map(
                &item("", "https://www.google.com/url?q=https%3A%2F%2Facme.com%2Fq1.pdf&sa=U"),
                SourceTag::Browser,
                &query,
            )
            .unwrap();
        assert_eq!(record.content(), "https://acme.com/q1.pdf");
        assert_eq!(record.origin_query(), "site:{domain} filetype:pdf");
    }
}
