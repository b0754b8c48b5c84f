//! Bounded-parallel file downloader for harvested file links.
//!
//! Each link is independent: failures are recorded in the summary and
//! never abort the batch. Writes go through a temp-file-then-rename
//! sequence so a killed process never leaves a truncated file that looks
//! complete. With resume enabled (the default), links whose derived
//! filename is already present are skipped without any network activity.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::DownloadConfig;
use crate::logger::HarvestLogger;

/// Extensions that are really server-side handlers, not document types.
/// When the response declares a known MIME type the filename is rewritten
/// to carry the real extension.
const HANDLER_EXTENSIONS: [&str; 5] = ["aspx", "php", "jsp", "cgi", "asp"];

/// MIME types worth refining a filename extension from.
static MIME_TO_EXT: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("application/pdf", "pdf"),
        ("application/msword", "doc"),
        (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "docx",
        ),
        ("application/vnd.ms-excel", "xls"),
        (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "xlsx",
        ),
        ("application/vnd.ms-powerpoint", "ppt"),
        (
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "pptx",
        ),
        ("application/zip", "zip"),
        ("application/x-zip-compressed", "zip"),
        ("text/plain", "txt"),
        ("text/csv", "csv"),
        ("image/jpeg", "jpg"),
        ("image/png", "png"),
        ("image/gif", "gif"),
    ])
});

/// Windows device names that cannot be used as filenames.
static RESERVED_NAMES: Lazy<HashSet<String>> = Lazy::new(|| {
    let mut names: HashSet<String> =
        ["CON", "PRN", "AUX", "NUL"].iter().map(|s| s.to_string()).collect();
    for i in 1..10 {
        names.insert(format!("COM{}", i));
        names.insert(format!("LPT{}", i));
    }
    names
});

static CD_FILENAME_UTF8: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"filename\*=UTF-8''([^;]+)").unwrap());
// Quoted names may contain spaces, so the quoted form is matched before
// the bare-token fallback.
static CD_FILENAME_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"filename="([^"]+)""#).unwrap());
static CD_FILENAME_PLAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"filename=([^"';\s]+)"#).unwrap());

/// Append-only outcome counters for one download batch.
#[derive(Debug, Default, Clone)]
pub struct DownloadSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_bytes: u64,
    pub by_extension: HashMap<String, usize>,
}

impl DownloadSummary {
    fn record_success(&mut self, filename: &str, bytes: u64) {
        self.succeeded += 1;
        self.total_bytes += bytes;
        if let Some(ext) = Path::new(filename).extension().and_then(|e| e.to_str()) {
            *self.by_extension.entry(ext.to_ascii_lowercase()).or_insert(0) += 1;
        }
    }
}

pub struct Downloader {
    client: reqwest::Client,
    output_dir: PathBuf,
    concurrency: usize,
    resume: bool,
    flaresolverr_url: Option<String>,
    timeout: Duration,
    logger: HarvestLogger,
}

impl Downloader {
    pub fn new(
        output_dir: PathBuf,
        config: &DownloadConfig,
        proxy: Option<&str>,
        flaresolverr_url: Option<&str>,
        user_agent: &str,
        logger: HarvestLogger,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.timeout_secs));
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("Invalid proxy URL")?);
        }
        let client = builder.build().context("Failed to create download client")?;
        Ok(Self {
            client,
            output_dir,
            concurrency: config.concurrency.max(1),
            resume: config.resume,
            flaresolverr_url: flaresolverr_url.map(|s| s.to_string()),
            timeout: Duration::from_secs(config.timeout_secs),
            logger,
        })
    }

    /// Download every URL with bounded parallelism. Returns the batch
    /// summary; individual failures never surface as errors here.
    pub async fn run(&self, urls: &[String]) -> Result<DownloadSummary> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;

        // Stems already on disk, for zero-network resume skips. The
        // response may later refine an extension, so matching is by stem
        // rather than full filename.
        let existing_stems = Arc::new(existing_stems(&self.output_dir).await?);
        // Filenames claimed by in-flight tasks, so two URLs resolving to
        // the same name get distinct suffixed files.
        let claimed: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let summary = Arc::new(Mutex::new(DownloadSummary::default()));
        let mut tasks = JoinSet::new();

        self.logger.start_progress(urls.len() as u64, "Downloading");

        for (idx, url) in urls.iter().cloned().enumerate() {
            let permit = Arc::clone(&semaphore).acquire_owned().await?;
            let task = DownloadTask {
                client: self.client.clone(),
                output_dir: self.output_dir.clone(),
                resume: self.resume,
                flaresolverr_url: self.flaresolverr_url.clone(),
                timeout: self.timeout,
                existing_stems: Arc::clone(&existing_stems),
                claimed: Arc::clone(&claimed),
                logger: self.logger.clone(),
            };
            let summary = Arc::clone(&summary);
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = task.fetch_one(&url, idx + 1).await;
                let mut summary = summary.lock().await;
                match outcome {
                    Ok(Fetched::Saved { filename, bytes }) => {
                        task.logger
                            .info(&format!("  {}  {}", truncated(&filename, 50), format_size(bytes as f64)));
                        summary.record_success(&filename, bytes);
                    }
                    Ok(Fetched::Skipped) => summary.skipped += 1,
                    Err(e) => {
                        // Shown at default verbosity; only --quiet hides it.
                        task.logger.info(&format!("  FAILED {}: {:#}", truncated(&url, 50), e));
                        summary.failed += 1;
                    }
                }
                task.logger.advance_progress();
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                self.logger.warn(&format!("download task panicked: {}", e));
            }
        }
        self.logger.finish_progress();

        let summary = summary.lock().await.clone();
        Ok(summary)
    }
}

enum Fetched {
    Saved { filename: String, bytes: u64 },
    Skipped,
}

struct DownloadTask {
    client: reqwest::Client,
    output_dir: PathBuf,
    resume: bool,
    flaresolverr_url: Option<String>,
    timeout: Duration,
    existing_stems: Arc<HashSet<String>>,
    claimed: Arc<Mutex<HashSet<String>>>,
    logger: HarvestLogger,
}

impl DownloadTask {
    async fn fetch_one(&self, url: &str, ordinal: usize) -> Result<Fetched> {
        // Resume check happens before any network call.
        let guessed = filename_from_url(url);
        if self.resume {
            if let Some(name) = &guessed {
                let stem = stem_of(name);
                if self.existing_stems.contains(&stem) {
                    debug!(url, file = name.as_str(), "already downloaded, skipping");
                    return Ok(Fetched::Skipped);
                }
            }
        }

        let response = match &self.flaresolverr_url {
            Some(relay) => self.fetch_via_relay(url, relay).await?,
            None => self
                .client
                .get(url)
                .send()
                .await
                .context("Request failed")?
                .error_for_status()
                .context("Server returned an error status")?,
        };

        let mut filename = filename_from_disposition(&response)
            .or(guessed)
            .unwrap_or_default();
        let mime_ext = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .and_then(|ct| MIME_TO_EXT.get(ct.as_str()).copied());
        filename = refine_extension(&filename, mime_ext);
        if filename.is_empty() || !filename.contains('.') {
            filename = match mime_ext {
                Some(ext) => format!("file_{}.{}", ordinal, ext),
                None => format!("file_{}", ordinal),
            };
        }
        filename = sanitize_filename(&filename);

        // The server may name the file differently from the URL, so the
        // resume check runs again once headers settled the real name. A
        // hit here drops the response instead of saving a suffixed copy.
        if self.resume && self.existing_stems.contains(&stem_of(&filename)) {
            debug!(url, file = filename.as_str(), "already downloaded under server name, skipping");
            return Ok(Fetched::Skipped);
        }

        // Claim a unique name before writing anything.
        let filename = {
            let mut claimed = self.claimed.lock().await;
            let unique = unique_name(&self.output_dir, &filename, &claimed);
            claimed.insert(unique.clone());
            unique
        };

        let final_path = self.output_dir.join(&filename);
        let temp_path = self.output_dir.join(format!(".{}.part", filename));

        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        let mut stream = response.bytes_stream();
        let mut bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&temp_path).await;
                    return Err(e).context("Transfer interrupted");
                }
            };
            bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed writing {}", temp_path.display()))?;
        }
        file.sync_all().await.context("Failed to flush file")?;
        drop(file);
        tokio::fs::rename(&temp_path, &final_path)
            .await
            .with_context(|| format!("Failed to finalize {}", final_path.display()))?;

        Ok(Fetched::Saved { filename, bytes })
    }

    /// Route one fetch through a FlareSolverr relay: ask the relay to
    /// clear the challenge, then replay the request with the solved
    /// cookies and user agent.
    async fn fetch_via_relay(&self, url: &str, relay: &str) -> Result<reqwest::Response> {
        let endpoint = format!("{}/v1", relay.trim_end_matches('/'));
        let solved: RelayResponse = self
            .client
            .post(&endpoint)
            .json(&json!({
                "cmd": "request.get",
                "url": url,
                "maxTimeout": self.timeout.as_millis() as u64,
            }))
            .timeout(self.timeout + Duration::from_secs(10))
            .send()
            .await
            .context("Relay request failed")?
            .error_for_status()
            .context("Relay returned an error status")?
            .json()
            .await
            .context("Relay returned invalid JSON")?;
        if solved.status != "ok" {
            anyhow::bail!("relay could not solve the challenge");
        }
        let solution = solved.solution.unwrap_or_default();
        let cookies = solution
            .cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        let mut request = self.client.get(url);
        if !solution.user_agent.is_empty() {
            request = request.header(reqwest::header::USER_AGENT, &solution.user_agent);
        }
        if !cookies.is_empty() {
            request = request.header(reqwest::header::COOKIE, cookies);
        }
        request
            .send()
            .await
            .context("Replay through relay cookies failed")?
            .error_for_status()
            .context("Server returned an error status")
    }
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    status: String,
    #[serde(default)]
    solution: Option<RelaySolution>,
}

#[derive(Debug, Default, Deserialize)]
struct RelaySolution {
    #[serde(default)]
    cookies: Vec<RelayCookie>,
    #[serde(default, rename = "userAgent")]
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct RelayCookie {
    name: String,
    value: String,
}

async fn existing_stems(dir: &Path) -> Result<HashSet<String>> {
    let mut stems = HashSet::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(stems),
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".part") {
            continue;
        }
        stems.insert(stem_of(&name));
    }
    Ok(stems)
}

fn stem_of(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| filename.to_ascii_lowercase())
}

/// Best-effort filename from the URL path's last segment.
fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = percent_decode(segment);
    let sanitized = sanitize_filename(&decoded);
    if sanitized == "file" {
        None
    } else {
        Some(sanitized)
    }
}

fn filename_from_disposition(response: &reqwest::Response) -> Option<String> {
    let header = response.headers().get(CONTENT_DISPOSITION)?.to_str().ok()?;
    disposition_filename(header)
}

fn disposition_filename(header: &str) -> Option<String> {
    if let Some(caps) = CD_FILENAME_UTF8.captures(header) {
        return Some(percent_decode(&caps[1]));
    }
    if let Some(caps) = CD_FILENAME_QUOTED.captures(header) {
        return Some(caps[1].to_string());
    }
    CD_FILENAME_PLAIN
        .captures(header)
        .map(|caps| caps[1].trim_matches('\'').to_string())
}

/// Replace a server-side handler extension (.aspx and friends) with the
/// extension implied by the response MIME type.
fn refine_extension(filename: &str, mime_ext: Option<&str>) -> String {
    let Some(mime_ext) = mime_ext else {
        return filename.to_string();
    };
    let path = Path::new(filename);
    let current = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match current {
        Some(ext) if HANDLER_EXTENSIONS.contains(&ext.as_str()) => {
            let stem = path.file_stem().map(|s| s.to_string_lossy().to_string());
            match stem {
                Some(stem) => format!("{}.{}", stem, mime_ext),
                None => filename.to_string(),
            }
        }
        _ => filename.to_string(),
    }
}

/// Strip characters unsafe for filenames and dodge reserved device names.
pub fn sanitize_filename(name: &str) -> String {
    let mut out: String = name
        .chars()
        .filter(|c| (*c as u32) >= 32)
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    out = out.trim_matches(|c| c == '.' || c == ' ').to_string();
    if out.is_empty() {
        return "file".to_string();
    }
    let stem = Path::new(&out)
        .file_stem()
        .map(|s| s.to_string_lossy().to_uppercase())
        .unwrap_or_default();
    if RESERVED_NAMES.contains(&stem) {
        out = format!("_{}", out);
    }
    out
}

fn unique_name(dir: &Path, filename: &str, claimed: &HashSet<String>) -> String {
    let taken = |name: &str| claimed.contains(name) || dir.join(name).exists();
    if !taken(filename) {
        return filename.to_string();
    }
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut counter = 1;
    loop {
        let candidate = format!("{}_{}{}", stem, counter, ext);
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn percent_decode(input: &str) -> String {
    percent_encoding::percent_decode_str(input)
        .decode_utf8_lossy()
        .into_owned()
}

pub fn format_size(mut n: f64) -> String {
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if n < 1024.0 {
            return format!("{:.2} {}", n, unit);
        }
        n /= 1024.0;
    }
    format!("{:.2} PB", n)
}

fn truncated(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{HarvestLogger, VerbosityLevel};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> DownloadConfig {
        DownloadConfig {
            concurrency: 2,
            resume: true,
            timeout_secs: 5,
        }
    }

    fn quiet_logger() -> HarvestLogger {
        HarvestLogger::new(VerbosityLevel::Silent)
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("a<b>c:d.pdf"), "a_b_c_d.pdf");
        assert_eq!(sanitize_filename("path/to\\file.txt"), "path_to_file.txt");
    }

    #[test]
    fn sanitize_prefixes_reserved_names() {
        assert_eq!(sanitize_filename("CON.txt"), "_CON.txt");
        assert_eq!(sanitize_filename("lpt3.pdf"), "_lpt3.pdf");
        assert_eq!(sanitize_filename("console.txt"), "console.txt");
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_filename("..."), "file");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[test]
    fn filename_from_url_takes_last_segment() {
        assert_eq!(
            filename_from_url("https://example.com/docs/report%202024.pdf"),
            Some("report 2024.pdf".to_string())
        );
        assert_eq!(filename_from_url("https://example.com/"), None);
    }

    #[test]
    fn disposition_filename_handles_quoting_variants() {
        assert_eq!(
            disposition_filename(r#"attachment; filename="annual report.xlsx""#),
            Some("annual report.xlsx".to_string())
        );
        assert_eq!(
            disposition_filename("attachment; filename=report.pdf"),
            Some("report.pdf".to_string())
        );
        assert_eq!(
            disposition_filename("attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"),
            Some("résumé.pdf".to_string())
        );
        assert_eq!(disposition_filename("inline"), None);
    }

    #[test]
    fn refine_rewrites_handler_extensions_only() {
        assert_eq!(refine_extension("download.aspx", Some("pdf")), "download.pdf");
        assert_eq!(refine_extension("report.pdf", Some("pdf")), "report.pdf");
        assert_eq!(refine_extension("download.aspx", None), "download.aspx");
    }

    #[test]
    fn format_size_picks_unit() {
        assert_eq!(format_size(512.0), "512.00 B");
        assert_eq!(format_size(2048.0), "2.00 KB");
        assert_eq!(format_size(5.0 * 1024.0 * 1024.0), "5.00 MB");
    }

    #[tokio::test]
    async fn downloads_and_renames_into_place() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/report.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.4 content".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(
            dir.path().to_path_buf(),
            &test_config(),
            None,
            None,
            "test-agent",
            quiet_logger(),
        )
        .unwrap();

        let urls = vec![format!("{}/files/report.pdf", server.uri())];
        let summary = downloader.run(&urls).await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.total_bytes, 16);
        assert_eq!(summary.by_extension.get("pdf"), Some(&1));
        assert!(dir.path().join("report.pdf").exists());
        assert!(!dir.path().join(".report.pdf.part").exists());
    }

    #[tokio::test]
    async fn resume_skips_existing_files_without_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/report.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let urls = vec![format!("{}/files/report.pdf", server.uri())];

        let downloader = Downloader::new(
            dir.path().to_path_buf(),
            &test_config(),
            None,
            None,
            "test-agent",
            quiet_logger(),
        )
        .unwrap();
        let first = downloader.run(&urls).await.unwrap();
        assert_eq!(first.succeeded, 1);

        // Second run over the identical link set hits the network zero
        // times; the mock's expect(1) enforces it.
        let downloader = Downloader::new(
            dir.path().to_path_buf(),
            &test_config(),
            None,
            None,
            "test-agent",
            quiet_logger(),
        )
        .unwrap();
        let second = downloader.run(&urls).await.unwrap();
        assert_eq!(second.succeeded, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(second.failed, 0);
    }

    #[tokio::test]
    async fn per_link_failures_do_not_abort_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_string("hello"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(
            dir.path().to_path_buf(),
            &test_config(),
            None,
            None,
            "test-agent",
            quiet_logger(),
        )
        .unwrap();

        let urls = vec![
            format!("{}/missing.pdf", server.uri()),
            format!("{}/ok.txt", server.uri()),
        ];
        let summary = downloader.run(&urls).await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(dir.path().join("ok.txt").exists());
    }

    #[tokio::test]
    async fn content_disposition_overrides_url_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fetch"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"annual report.xlsx\"")
                    .set_body_bytes(b"cells".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(
            dir.path().to_path_buf(),
            &test_config(),
            None,
            None,
            "test-agent",
            quiet_logger(),
        )
        .unwrap();

        let urls = vec![format!("{}/fetch", server.uri())];
        let summary = downloader.run(&urls).await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert!(dir.path().join("annual report.xlsx").exists());
    }

    #[tokio::test]
    async fn rerun_skips_server_named_files_instead_of_duplicating() {
        let server = MockServer::start().await;
        // The real name only surfaces in the response headers, so the
        // second run must fetch once more before it can recognize the
        // file; it must then skip, not save a suffixed copy.
        Mock::given(method("GET"))
            .and(path("/fetch"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"annual report.xlsx\"")
                    .set_body_bytes(b"cells".to_vec()),
            )
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let urls = vec![format!("{}/fetch", server.uri())];

        let downloader = Downloader::new(
            dir.path().to_path_buf(),
            &test_config(),
            None,
            None,
            "test-agent",
            quiet_logger(),
        )
        .unwrap();
        let first = downloader.run(&urls).await.unwrap();
        assert_eq!(first.succeeded, 1);

        let downloader = Downloader::new(
            dir.path().to_path_buf(),
            &test_config(),
            None,
            None,
            "test-agent",
            quiet_logger(),
        )
        .unwrap();
        let second = downloader.run(&urls).await.unwrap();
        assert_eq!(second.succeeded, 0);
        assert_eq!(second.skipped, 1);
        assert!(dir.path().join("annual report.xlsx").exists());
        assert!(!dir.path().join("annual report_1.xlsx").exists());
    }

    #[tokio::test]
    async fn failed_links_are_reported_at_default_verbosity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("run.log");
        let logger = HarvestLogger::with_log_file(
            VerbosityLevel::Summary,
            log_path.display().to_string(),
        );
        let downloader = Downloader::new(
            dir.path().to_path_buf(),
            &test_config(),
            None,
            None,
            "test-agent",
            logger.clone(),
        )
        .unwrap();

        let urls = vec![format!("{}/gone.pdf", server.uri())];
        let summary = downloader.run(&urls).await.unwrap();
        assert_eq!(summary.failed, 1);

        logger.export_logs().unwrap();
        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("FAILED"));
    }
}
