use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Normal,
    Oversized,
}

/// One candidate file, extracted once per run and never mutated afterwards.
#[derive(Serialize, Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    /// File name including extension; oversized documents pair on it.
    pub name: String,
    pub tags: BTreeSet<String>,
    /// Ranked by frequency, filename tokens last.
    pub keywords: Vec<String>,
    pub last_modified: DateTime<Utc>,
    #[serde(skip)]
    pub content: Option<String>,
    pub size_class: SizeClass,
    pub extraction_error: Option<String>,
}

impl Document {
    pub fn is_oversized(&self) -> bool {
        self.size_class == SizeClass::Oversized
    }

    /// True when the full text is available for section merging.
    pub fn is_mergeable(&self) -> bool {
        !self.is_oversized() && self.extraction_error.is_none() && self.content.is_some()
    }

    pub fn content_len(&self) -> usize {
        self.content.as_ref().map(|c| c.len()).unwrap_or(0)
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => &self.name[..idx],
            _ => &self.name,
        }
    }
}

/// Outcome of comparing two documents.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PairScore {
    pub overlap: f64,
    pub reason: String,
}
