//! Scripted stand-ins for the source drivers and the operator prompt,
//! used to drive the orchestrator deterministically.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use scry::checkpoint::{CheckpointSink, RunCheckpoint};
use scry::interrupt::{InterruptChoice, OperatorPrompt};
use scry::query::Query;
use scry::record::{SearchResultItem, SourceTag};
use scry::source::{FetchError, PageFetch, SourceDriver};

/// One scripted response for a (query, page) fetch.
pub enum StubStep {
    Page(Vec<SearchResultItem>, bool),
    Captcha,
    SessionEnded,
    Transient,
    Auth,
    RateLimited,
}

type CallHook = Box<dyn Fn(&str, u32) + Send + Sync>;

/// Driver that replays a per-query script and records every call it sees.
pub struct StubDriver {
    tag: SourceTag,
    cap: u32,
    steps: Mutex<HashMap<String, VecDeque<StubStep>>>,
    calls: Arc<Mutex<Vec<(String, u32)>>>,
    on_call: Option<CallHook>,
}

impl StubDriver {
    pub fn new(tag: SourceTag, cap: u32) -> Self {
        Self {
            tag,
            cap,
            steps: Mutex::new(HashMap::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
            on_call: None,
        }
    }

    /// Queue the next responses for a query, consumed in call order.
    pub fn script(self, query_text: &str, steps: Vec<StubStep>) -> Self {
        self.steps
            .lock()
            .unwrap()
            .entry(query_text.to_string())
            .or_default()
            .extend(steps);
        self
    }

    /// Invoke `hook` on every fetch before the scripted response is served.
    pub fn with_call_hook(mut self, hook: impl Fn(&str, u32) + Send + Sync + 'static) -> Self {
        self.on_call = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<(String, u32)>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl SourceDriver for StubDriver {
    fn tag(&self) -> SourceTag {
        self.tag
    }

    fn page_cap(&self) -> u32 {
        self.cap
    }

    async fn fetch_page(&self, query: &Query, page_index: u32) -> Result<PageFetch, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.text.clone(), page_index));
        if let Some(hook) = &self.on_call {
            hook(&query.text, page_index);
        }
        let step = self
            .steps
            .lock()
            .unwrap()
            .get_mut(&query.text)
            .and_then(|queue| queue.pop_front());
        match step {
            Some(StubStep::Page(items, has_more)) => Ok(PageFetch::Items { items, has_more }),
            Some(StubStep::Captcha) => Ok(PageFetch::CaptchaPending),
            Some(StubStep::SessionEnded) | None => Ok(PageFetch::SessionEnded),
            Some(StubStep::Transient) => Err(FetchError::Transient("stubbed failure".to_string())),
            Some(StubStep::Auth) => Err(FetchError::Auth("stubbed 401".to_string())),
            Some(StubStep::RateLimited) => Err(FetchError::RateLimited),
        }
    }
}

/// Prompt that replays a queue of interrupt choices and counts CAPTCHA
/// acknowledgments.
pub struct StubPrompt {
    choices: Mutex<VecDeque<InterruptChoice>>,
    captcha_acks: Mutex<usize>,
    acks_captchas: bool,
}

impl StubPrompt {
    pub fn new(choices: Vec<InterruptChoice>) -> Self {
        Self {
            choices: Mutex::new(choices.into()),
            captcha_acks: Mutex::new(0),
            acks_captchas: true,
        }
    }

    /// Prompt that behaves like a run with no operator attached: CAPTCHA
    /// acknowledgments never arrive.
    pub fn detached() -> Self {
        Self {
            choices: Mutex::new(VecDeque::new()),
            captcha_acks: Mutex::new(0),
            acks_captchas: false,
        }
    }

    pub fn captcha_acks(&self) -> usize {
        *self.captcha_acks.lock().unwrap()
    }
}

impl OperatorPrompt for StubPrompt {
    fn await_interrupt_choice(&self) -> InterruptChoice {
        self.choices
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(InterruptChoice::Quit)
    }

    fn await_captcha_ack(&self) -> bool {
        *self.captcha_acks.lock().unwrap() += 1;
        self.acks_captchas
    }
}

/// Checkpoint sink that keeps every persisted snapshot in memory.
#[derive(Default)]
pub struct MemorySink {
    persisted: Mutex<Vec<RunCheckpoint>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<RunCheckpoint> {
        self.persisted.lock().unwrap().clone()
    }
}

impl CheckpointSink for MemorySink {
    fn persist(&self, checkpoint: &RunCheckpoint) -> anyhow::Result<()> {
        self.persisted.lock().unwrap().push(checkpoint.clone());
        Ok(())
    }
}

/// Search result shaped like a LinkedIn profile hit.
pub fn profile_item(name: &str, role: &str) -> SearchResultItem {
    let slug = name.to_lowercase().replace(' ', "-");
    SearchResultItem {
        title: format!("{} - {} | LinkedIn", name, role),
        url: format!("https://www.linkedin.com/in/{}", slug),
        snippet: String::new(),
    }
}

/// Search result pointing at a downloadable file.
pub fn file_item(url: &str) -> SearchResultItem {
    SearchResultItem {
        title: url.rsplit('/').next().unwrap_or(url).to_string(),
        url: url.to_string(),
        snippet: String::new(),
    }
}

pub fn page(items: Vec<SearchResultItem>, has_more: bool) -> StubStep {
    StubStep::Page(items, has_more)
}
