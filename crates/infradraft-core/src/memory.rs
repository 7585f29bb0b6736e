//! Per-project decision history, kept for humans to read.
//!
//! Nothing in the pipeline depends on it for correctness: read failures give
//! an empty history and write failures are logged.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Decision, StageKind};

pub const MEMORY_FILE: &str = ".devops_memory.json";
pub const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: StageKind,
    pub decision: Decision,
    pub reason: String,
    pub content_snippet: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct MemoryFile {
    #[serde(default)]
    history: Vec<MemoryEntry>,
}

/// File-backed history at `<project>/.devops_memory.json`.
#[derive(Debug, Clone)]
pub struct LongTermMemory {
    path: PathBuf,
    data: MemoryFile,
}

impl LongTermMemory {
    pub fn open(project: &Path) -> Self {
        let path = project.join(MEMORY_FILE);
        let data = std::fs::read(&path)
            .ok()
            .and_then(|bytes| match serde_json::from_slice(&bytes) {
                Ok(data) => Some(data),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "unreadable memory file; starting empty");
                    None
                }
            })
            .unwrap_or_default();
        Self { path, data }
    }

    pub fn history(&self) -> &[MemoryEntry] {
        &self.data.history
    }

    pub fn history_for(&self, stage: StageKind) -> Vec<&MemoryEntry> {
        self.data.history.iter().filter(|e| e.stage == stage).collect()
    }

    pub fn store_decision(&mut self, stage: StageKind, decision: Decision, reason: &str, content: &str) {
        self.data.history.push(MemoryEntry {
            timestamp: Utc::now(),
            stage,
            decision,
            reason: reason.to_string(),
            content_snippet: snippet(content),
        });
        if let Err(err) = self.save() {
            warn!(path = %self.path.display(), error = %err, "failed to save memory");
        }
    }

    fn save(&self) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(&self.data)?;
        std::fs::write(&self.path, json)
    }
}

fn snippet(content: &str) -> String {
    if content.chars().count() > SNIPPET_CHARS {
        let head: String = content.chars().take(SNIPPET_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}
