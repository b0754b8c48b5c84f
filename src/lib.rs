// Allow dead code for public API functions that may not be used internally
// but are part of the library's exposed interface
#![allow(dead_code)]

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod download;
pub mod export;
pub mod extract;
pub mod interrupt;
pub mod logger;
pub mod orchestrator;
pub mod query;
pub mod record;
pub mod source;
pub mod store;

pub use orchestrator::{HarvestOrchestrator, RunMode, RunOutcome, RunStatus};
pub use record::{HarvestRecord, SourceTag};
pub use store::SharedResultStore;
