//! Drives dork queries through one or both sources, merging results into
//! the deduplicating store.
//!
//! One orchestrating flow of control per run. The API pass fans out over a
//! bounded worker pool (ApiDriver calls are safe to run concurrently for
//! distinct queries); the browser pass runs on a single worker because the
//! session is a mutual-exclusion resource. All suspension protocols —
//! CAPTCHA-wait and operator skip/quit — are observed only at page
//! boundaries, so the store never sees a half-processed page.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::checkpoint::{CheckpointSink, RunCheckpoint};
use crate::interrupt::{InterruptChoice, InterruptController};
use crate::logger::HarvestLogger;
use crate::query::Query;
use crate::record::{HarvestRecord, RecordMapper};
use crate::source::{FetchError, PageFetch, SourceDriver};
use crate::store::SharedResultStore;

/// Which sources a run uses, resolved from `--source` and key presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    ApiOnly,
    BrowserOnly,
    /// Full API pass first (bulk, fast), then the browser pass over the
    /// same queries; on identity-key collisions the API record wins.
    Auto,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::ApiOnly => "api",
            RunMode::BrowserOnly => "browser",
            RunMode::Auto => "auto",
        }
    }

    /// Resolve the run mode from the `--source` flag and API key presence.
    pub fn resolve(source: &str, has_api_key: bool) -> anyhow::Result<Self> {
        match source {
            "api" => {
                if !has_api_key {
                    anyhow::bail!("--source api requires --api-key or SERPER_API_KEY");
                }
                Ok(RunMode::ApiOnly)
            }
            "browser" => Ok(RunMode::BrowserOnly),
            "auto" => Ok(if has_api_key { RunMode::Auto } else { RunMode::BrowserOnly }),
            other => anyhow::bail!("unknown source '{}', expected auto|api|browser", other),
        }
    }
}

/// How a run ended. `CompletedEarly` (operator quit) is a normal outcome,
/// not an error; `SourceFailed` means every selected source aborted but
/// gathered results were still preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    CompletedEarly,
    SourceFailed,
}

/// Final, frozen result of a run. Produced exactly once per run on every
/// exit path; gathered data is never silently discarded.
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub records: Vec<HarvestRecord>,
    /// Queries that ran all their pages on at least one source. Skipped,
    /// quit, and aborted queries are not counted.
    pub queries_completed: usize,
}

/// Why a source pass stopped before finishing its queries.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PassAbort {
    Auth(String),
    RateLimited,
}

#[derive(Debug, Default)]
struct PassReport {
    abort: Option<PassAbort>,
}

/// Shared state threaded through every worker of one source pass.
#[derive(Clone)]
struct PassContext {
    driver: Arc<dyn SourceDriver>,
    mapper: Arc<dyn RecordMapper>,
    store: SharedResultStore,
    interrupts: Arc<InterruptController>,
    checkpoint: Arc<dyn CheckpointSink>,
    /// Pages committed per query text; also the checkpoint payload source.
    progress: Arc<StdMutex<HashMap<String, u32>>>,
    /// Run-wide stop raised by an operator quit.
    quit: Arc<AtomicBool>,
    /// Pass-wide stop raised by a terminal `SessionEnded` signal.
    pass_ended: Arc<AtomicBool>,
    /// Query texts that ran to their natural end, across both passes.
    completed: Arc<StdMutex<HashSet<String>>>,
    mode: RunMode,
    logger: HarvestLogger,
}

pub struct HarvestOrchestrator {
    store: SharedResultStore,
    interrupts: Arc<InterruptController>,
    checkpoint: Arc<dyn CheckpointSink>,
    mapper: Arc<dyn RecordMapper>,
    logger: HarvestLogger,
    api_workers: usize,
}

impl HarvestOrchestrator {
    pub fn new(
        interrupts: Arc<InterruptController>,
        checkpoint: Arc<dyn CheckpointSink>,
        mapper: Arc<dyn RecordMapper>,
        logger: HarvestLogger,
        api_workers: usize,
    ) -> Self {
        Self {
            store: SharedResultStore::new(),
            interrupts,
            checkpoint,
            mapper,
            logger,
            api_workers: api_workers.max(1),
        }
    }

    /// Run all queries to completion per the selected mode and finalize
    /// the store. The returned snapshot is the single hand-off point to
    /// output writers and the downloader.
    pub async fn run(
        &self,
        mode: RunMode,
        queries: &[Query],
        api: Option<Arc<dyn SourceDriver>>,
        browser: Option<Arc<dyn SourceDriver>>,
    ) -> RunOutcome {
        let quit = Arc::new(AtomicBool::new(false));
        let progress: Arc<StdMutex<HashMap<String, u32>>> = Arc::new(StdMutex::new(HashMap::new()));
        let completed: Arc<StdMutex<HashSet<String>>> = Arc::new(StdMutex::new(HashSet::new()));

        let mut api_abort = None;
        let mut browser_abort = None;

        if matches!(mode, RunMode::ApiOnly | RunMode::Auto) {
            if let Some(driver) = api {
                self.logger.info("Starting API pass");
                let report = self
                    .run_pass(driver, queries, self.api_workers, mode, &quit, &progress, &completed)
                    .await;
                if let Some(abort) = &report.abort {
                    match abort {
                        PassAbort::RateLimited if mode == RunMode::Auto => {
                            self.logger
                                .info("API quota exhausted; falling back to browser source");
                        }
                        PassAbort::RateLimited => self.logger.error("API quota exhausted"),
                        PassAbort::Auth(reason) => {
                            self.logger.error(&format!("API authentication failed: {}", reason))
                        }
                    }
                }
                api_abort = report.abort;
            }
        }

        if matches!(mode, RunMode::BrowserOnly | RunMode::Auto) && !quit.load(Ordering::SeqCst) {
            if let Some(driver) = browser {
                self.logger.info("Starting browser pass");
                // Single worker: the session tolerates no concurrent use.
                let report = self
                    .run_pass(driver, queries, 1, mode, &quit, &progress, &completed)
                    .await;
                browser_abort = report.abort;
            }
        }

        let status = if quit.load(Ordering::SeqCst) {
            RunStatus::CompletedEarly
        } else {
            match mode {
                RunMode::ApiOnly if api_abort.is_some() => RunStatus::SourceFailed,
                RunMode::BrowserOnly if browser_abort.is_some() => RunStatus::SourceFailed,
                RunMode::Auto if api_abort.is_some() && browser_abort.is_some() => {
                    RunStatus::SourceFailed
                }
                _ => RunStatus::Completed,
            }
        };

        RunOutcome {
            status,
            records: self.store.snapshot(),
            queries_completed: completed.lock().map(|set| set.len()).unwrap_or(0),
        }
    }

    /// Run one source pass over all queries with a bounded worker pool.
    async fn run_pass(
        &self,
        driver: Arc<dyn SourceDriver>,
        queries: &[Query],
        workers: usize,
        mode: RunMode,
        quit: &Arc<AtomicBool>,
        progress: &Arc<StdMutex<HashMap<String, u32>>>,
        completed: &Arc<StdMutex<HashSet<String>>>,
    ) -> PassReport {
        let ctx = PassContext {
            driver,
            mapper: Arc::clone(&self.mapper),
            store: self.store.clone(),
            interrupts: Arc::clone(&self.interrupts),
            checkpoint: Arc::clone(&self.checkpoint),
            progress: Arc::clone(progress),
            quit: Arc::clone(quit),
            pass_ended: Arc::new(AtomicBool::new(false)),
            completed: Arc::clone(completed),
            mode,
            logger: self.logger.clone(),
        };

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks: JoinSet<Option<PassAbort>> = JoinSet::new();

        for query in queries.iter().cloned() {
            if ctx.quit.load(Ordering::SeqCst) || ctx.pass_ended.load(Ordering::SeqCst) {
                break;
            }
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                run_query(ctx, query).await
            });
        }

        let mut report = PassReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(abort)) => {
                    // First abort wins; it ends the pass for every worker.
                    if report.abort.is_none() {
                        report.abort = Some(abort);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("harvest worker panicked: {}", e),
            }
        }
        report
    }
}

/// Drive one query through its pages on one source. Returns the abort
/// reason if this worker hit a pass-ending error.
async fn run_query(ctx: PassContext, query: Query) -> Option<PassAbort> {
    let cap = ctx.driver.page_cap().min(query.page_limit.max(1));
    let tag = ctx.driver.tag();
    let mut page: u32 = 1;

    while page <= cap {
        if ctx.quit.load(Ordering::SeqCst) || ctx.pass_ended.load(Ordering::SeqCst) {
            return None;
        }

        // Operator interrupts are claimed by exactly one worker and only
        // between pages, never mid-fetch.
        if ctx.interrupts.take_pending() {
            match ctx.interrupts.resolve_interrupt().await {
                InterruptChoice::Skip => {
                    ctx.logger.warn(&format!("Skipped remaining pages of: {}", query.text));
                    return None;
                }
                InterruptChoice::Quit => {
                    ctx.logger.info("Quit requested; finalizing with results gathered so far");
                    ctx.quit.store(true, Ordering::SeqCst);
                    return None;
                }
            }
        }

        match ctx.driver.fetch_page(&query, page).await {
            Ok(PageFetch::Items { items, has_more }) => {
                // A quit acted on while this page was in flight discards
                // it whole; committed pages are never rolled back.
                if ctx.quit.load(Ordering::SeqCst) {
                    return None;
                }
                let records: Vec<HarvestRecord> = items
                    .iter()
                    .filter_map(|item| ctx.mapper.map(item, tag, &query))
                    .collect();
                let inserted = ctx.store.add_page(records);
                debug!(
                    source = tag.as_str(),
                    query = %query.text,
                    page,
                    inserted,
                    "page committed"
                );
                ctx.logger.record_page_fetched();
                commit_checkpoint(&ctx, &query, page);
                if !has_more {
                    mark_completed(&ctx, &query);
                    return None;
                }
                page += 1;
            }
            Ok(PageFetch::CaptchaPending) => {
                // Suspend until a human resolves the challenge, then
                // re-issue the identical (query, page) fetch. An
                // unattended run has nobody to solve it, so the pass
                // ends instead of hammering the same page.
                ctx.logger.info(&format!(
                    "CAPTCHA on '{}' page {}; waiting for operator",
                    query.text, page
                ));
                if !ctx.interrupts.wait_for_captcha_ack().await {
                    ctx.logger
                        .info("CAPTCHA cannot be solved unattended; keeping results gathered so far");
                    ctx.pass_ended.store(true, Ordering::SeqCst);
                    return None;
                }
            }
            Ok(PageFetch::SessionEnded) => {
                // Not an error: stop this source pass, keep everything.
                ctx.logger
                    .info("Browser session ended; keeping results gathered so far");
                ctx.pass_ended.store(true, Ordering::SeqCst);
                return None;
            }
            Err(FetchError::Transient(reason)) => {
                // One query's failure never aborts the run; log and move
                // to the next query.
                ctx.logger.warn(&format!(
                    "Giving up on '{}' page {} after retries: {}",
                    query.text, page, reason
                ));
                return None;
            }
            Err(FetchError::Auth(reason)) => {
                ctx.pass_ended.store(true, Ordering::SeqCst);
                return Some(PassAbort::Auth(reason));
            }
            Err(FetchError::RateLimited) => {
                ctx.pass_ended.store(true, Ordering::SeqCst);
                return Some(PassAbort::RateLimited);
            }
        }
    }
    // Page budget exhausted, a natural end.
    mark_completed(&ctx, &query);
    None
}

fn mark_completed(ctx: &PassContext, query: &Query) {
    ctx.completed
        .lock()
        .expect("completed lock poisoned")
        .insert(query.text.clone());
}

/// Record page completion and persist the snapshot. The progress lock
/// also serializes checkpoint writes across workers.
fn commit_checkpoint(ctx: &PassContext, query: &Query, page: u32) {
    let mut done = ctx.progress.lock().expect("progress lock poisoned");
    done.insert(query.text.clone(), page);
    let mut checkpoint = RunCheckpoint::new(ctx.mode.as_str());
    checkpoint.pages_done = done.clone();
    checkpoint.records = ctx.store.snapshot();
    if let Err(e) = ctx.checkpoint.persist(&checkpoint) {
        warn!("checkpoint write failed: {}", e);
    }
}
