use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ConsolidateError, Result};
use crate::merge::Conflict;

pub const DETAIL_LOG: &str = "merge-details.log";
pub const SUMMARY_LOG: &str = "merge-summary.log";

/// Full record of one merge, appended as a YAML document.
#[derive(Serialize, Debug, Clone)]
pub struct DetailRecord {
    pub timestamp: DateTime<Utc>,
    pub canonical: String,
    pub base: String,
    pub related: Vec<String>,
    pub reasons: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub degraded: bool,
}

/// Counts only, appended as one JSON line.
#[derive(Serialize, Debug, Clone)]
pub struct SummaryRecord {
    pub timestamp: DateTime<Utc>,
    pub canonical: String,
    pub members: usize,
    pub conflicts: usize,
    pub degraded: bool,
}

/// Append-only pair of audit logs under one directory.
#[derive(Debug, Clone)]
pub struct Ledger {
    dir: PathBuf,
}

impl Ledger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn detail_path(&self) -> PathBuf {
        self.dir.join(DETAIL_LOG)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_LOG)
    }

    pub fn append(&self, detail: &DetailRecord, summary: &SummaryRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| ConsolidateError::io(&self.dir, e))?;

        let yaml = serde_yaml::to_string(detail).map_err(|e| ConsolidateError::Ledger(e.to_string()))?;
        append_text(&self.detail_path(), &format!("---\n{}", yaml))?;

        let json = serde_json::to_string(summary).map_err(|e| ConsolidateError::Ledger(e.to_string()))?;
        append_text(&self.summary_path(), &format!("{}\n", json))?;
        Ok(())
    }
}

fn append_text(path: &Path, text: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ConsolidateError::io(path, e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| ConsolidateError::io(path, e))
}
