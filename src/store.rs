//! Append-only, deduplicating accumulator for one harvest run.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::record::HarvestRecord;

/// Keeps every distinct record in first-insertion order. `add` is
/// idempotent: re-adding a record whose identity key is already present is
/// a no-op.
#[derive(Debug, Default)]
pub struct ResultStore {
    records: Vec<HarvestRecord>,
    keys: HashSet<String>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. Returns true if it was new, false if its identity
    /// key was already present (the existing record is kept untouched, so
    /// on cross-source collisions the first source's metadata wins).
    pub fn add(&mut self, record: HarvestRecord) -> bool {
        let key = record.identity_key();
        if !self.keys.insert(key) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// All records in first-insertion order. Side-effect free; used for
    /// both per-page checkpoints and final output.
    pub fn snapshot(&self) -> Vec<HarvestRecord> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Thread-safe store handle. The mutex is held only for the duration of a
/// single insert or snapshot, never across a fetch.
#[derive(Debug, Clone, Default)]
pub struct SharedResultStore {
    inner: Arc<Mutex<ResultStore>>,
}

impl SharedResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, record: HarvestRecord) -> bool {
        self.inner.lock().expect("store lock poisoned").add(record)
    }

    /// Commit one whole page of records under a single lock acquisition so
    /// a concurrent snapshot never observes a half-inserted page.
    pub fn add_page(&self, records: Vec<HarvestRecord>) -> usize {
        let mut store = self.inner.lock().expect("store lock poisoned");
        records.into_iter().map(|r| store.add(r)).filter(|&new| new).count()
    }

    pub fn snapshot(&self) -> Vec<HarvestRecord> {
        self.inner.lock().expect("store lock poisoned").snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").len()
    }
}
