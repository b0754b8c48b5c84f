//! Per-page run checkpointing.
//!
//! After every committed page the orchestrator writes the current store
//! snapshot through a `CheckpointSink`, so a hard stop loses at most the
//! in-flight page. The file implementation writes atomically (temp file,
//! fsync, rename) so an interrupted process never leaves a corrupt
//! checkpoint behind.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::record::HarvestRecord;

/// Hidden file to avoid cluttering the output directory.
pub const CHECKPOINT_FILENAME: &str = ".scry-checkpoint.json";

/// Bump when making breaking changes to the checkpoint format.
pub const CHECKPOINT_VERSION: u32 = 1;

/// A consistent snapshot of run progress, valid at every page boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Run mode as selected at start ("api" | "browser" | "auto").
    pub mode: String,
    /// Pages committed so far, keyed by resolved query text.
    pub pages_done: HashMap<String, u32>,
    /// Deduplicated records in first-insertion order.
    pub records: Vec<HarvestRecord>,
}

impl RunCheckpoint {
    pub fn new(mode: &str) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            created_at: Utc::now(),
            mode: mode.to_string(),
            pages_done: HashMap::new(),
            records: Vec::new(),
        }
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CHECKPOINT_FILENAME)
    }

    pub fn exists(dir: &Path) -> bool {
        Self::path_in(dir).exists()
    }

    /// Load and version-check a checkpoint file.
    pub fn load(dir: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(Self::path_in(dir))?;
        let checkpoint: RunCheckpoint = serde_json::from_str(&content)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            anyhow::bail!(
                "Incompatible checkpoint version: file has version {} but current version is {}. \
                 Delete the checkpoint file to start fresh.",
                checkpoint.version,
                CHECKPOINT_VERSION
            );
        }
        Ok(checkpoint)
    }

    /// Remove the checkpoint file (called on successful completion).
    pub fn delete(dir: &Path) -> Result<()> {
        let path = Self::path_in(dir);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Lightweight persistence hook the orchestrator writes through after
/// every page.
pub trait CheckpointSink: Send + Sync {
    fn persist(&self, checkpoint: &RunCheckpoint) -> Result<()>;
}

/// Atomic on-disk checkpoint in a fixed directory.
pub struct FileCheckpoint {
    dir: PathBuf,
}

impl FileCheckpoint {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl CheckpointSink for FileCheckpoint {
    fn persist(&self, checkpoint: &RunCheckpoint) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = RunCheckpoint::path_in(&self.dir);
        let temp_path = self.dir.join(".scry-checkpoint.tmp");
        let content = serde_json::to_string_pretty(checkpoint)?;

        // Write to a temp file and fsync before the rename so a crash
        // mid-write cannot truncate the real checkpoint.
        {
            let mut file = std::fs::File::create(&temp_path)?;
            std::io::Write::write_all(&mut file, content.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

/// No-op sink for stdout/dry runs and tests that don't care about
/// persistence.
pub struct NullCheckpoint;

impl CheckpointSink for NullCheckpoint {
    fn persist(&self, _checkpoint: &RunCheckpoint) -> Result<()> {
        Ok(())
    }
}
