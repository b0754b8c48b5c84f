//! Query planning: dork templates, placeholder resolution, page limits.
//!
//! Malformed dorks (a `{domain}` placeholder with no domain supplied) are
//! rejected here, before any network call is made.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard pagination ceiling enforced by the Serper API.
pub const API_PAGE_CAP: u32 = 100;

/// Built-in dorks for contacts mode, targeting people-directory sites.
pub const CONTACT_DORKS: [&str; 3] = [
    r#"site:linkedin.com/in/ "{company}""#,
    r#"site:rocketreach.co "{domain}""#,
    r#"site:zoominfo.com/p/ "{company}""#,
];

/// Example dorks shown by `--show-examples`.
pub const DORK_EXAMPLES: [(&str, &str); 10] = [
    ("site:{domain} filetype:pdf", "PDFs on target domain"),
    ("site:{domain} filetype:doc OR filetype:docx", "Word docs"),
    ("site:{domain} filetype:xlsx OR filetype:xls", "Spreadsheets"),
    ("site:{domain} filetype:pptx OR filetype:ppt", "Presentations"),
    ("inurl:admin site:{domain}", "Admin panels"),
    (r#"intitle:"index of" site:{domain}"#, "Open directories"),
    ("site:{domain} inurl:login", "Login pages"),
    ("site:{domain} filetype:env OR filetype:cfg", "Config files"),
    (r#"site:linkedin.com/in/ "{company}""#, "LinkedIn profiles"),
    (r#"site:rocketreach.co "{domain}""#, "RocketReach contacts"),
];

#[derive(Error, Debug, PartialEq)]
pub enum PlanError {
    #[error("dork '{0}' contains {{domain}} but no --domain was provided")]
    MissingDomain(String),

    #[error("dork '{0}' contains {{company}} but no --company was provided")]
    MissingCompany(String),

    #[error("no dorks to run (provide -q/--query or --dorks-file)")]
    Empty,
}

/// One resolved search query with its pagination budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// The dork template this query came from, placeholders intact.
    pub dork_id: String,
    /// The fully resolved search string sent to the sources.
    pub text: String,
    /// Requested pages for this query; each source additionally clamps to
    /// its own cap.
    pub page_limit: u32,
}

impl Query {
    pub fn new(dork_id: impl Into<String>, text: impl Into<String>, page_limit: u32) -> Self {
        Self {
            dork_id: dork_id.into(),
            text: text.into(),
            page_limit,
        }
    }
}

/// Substitute `{domain}` and `{company}` placeholders, failing when a
/// placeholder is present but its value is not.
pub fn resolve_placeholders(
    dork: &str,
    domain: Option<&str>,
    company: Option<&str>,
) -> Result<String, PlanError> {
    if dork.contains("{domain}") && domain.is_none() {
        return Err(PlanError::MissingDomain(dork.to_string()));
    }
    if dork.contains("{company}") && company.is_none() {
        return Err(PlanError::MissingCompany(dork.to_string()));
    }
    let mut out = dork.to_string();
    if let Some(d) = domain {
        out = out.replace("{domain}", d);
    }
    if let Some(c) = company {
        out = out.replace("{company}", c);
    }
    Ok(out)
}

/// Build the contacts-mode query plan from the built-in dork set.
pub fn plan_contact_queries(
    domain: &str,
    company: &str,
    pages: u32,
) -> Result<Vec<Query>, PlanError> {
    CONTACT_DORKS
        .iter()
        .map(|dork| {
            resolve_placeholders(dork, Some(domain), Some(company))
                .map(|text| Query::new(*dork, text, pages))
        })
        .collect()
}

/// Build the files-mode query plan from user-supplied dorks.
pub fn plan_file_queries(
    dorks: &[String],
    domain: Option<&str>,
    company: Option<&str>,
    pages: u32,
) -> Result<Vec<Query>, PlanError> {
    if dorks.is_empty() {
        return Err(PlanError::Empty);
    }
    dorks
        .iter()
        .map(|dork| {
            resolve_placeholders(dork, domain, company)
                .map(|text| Query::new(dork.clone(), text, pages))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_resolved() {
        let q = resolve_placeholders("site:{domain} \"{company}\"", Some("acme.com"), Some("Acme"))
            .unwrap();
        assert_eq!(q, "site:acme.com \"Acme\"");
    }

    #[test]
    fn missing_domain_rejected_at_plan_time() {
        let err = resolve_placeholders("site:{domain} filetype:pdf", None, Some("Acme")).unwrap_err();
        assert!(matches!(err, PlanError::MissingDomain(_)));
    }

    #[test]
    fn missing_company_rejected_at_plan_time() {
        let err = plan_file_queries(
            &["intext:\"{company}\" resume".to_string()],
            Some("acme.com"),
            None,
            5,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::MissingCompany(_)));
    }

    #[test]
    fn empty_plan_rejected() {
        assert_eq!(plan_file_queries(&[], None, None, 5).unwrap_err(), PlanError::Empty);
    }

    #[test]
    fn contact_plan_covers_builtin_dorks() {
        let queries = plan_contact_queries("acme.com", "Acme", 10).unwrap();
        assert_eq!(queries.len(), CONTACT_DORKS.len());
        assert!(queries.iter().all(|q| q.page_limit == 10));
        assert!(queries[0].text.contains("Acme"));
        assert!(queries[1].text.contains("acme.com"));
    }
}
