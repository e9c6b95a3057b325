use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConsolidateError, Result};

/// Files above this size are probed, never read whole (100 MiB).
pub const DEFAULT_OVERSIZED_BYTES: u64 = 100 * 1024 * 1024;

pub const DEFAULT_CONFIG_FILE: &str = ".docfold.toml";

/// Tags that mark a cross-cutting topic. Sharing one forces a merge.
pub const DEFAULT_SYSTEM_TAGS: &[&str] = &[
    "#firebase",
    "#security",
    "#deployment",
    "#testing",
    "#architecture",
    "#onboarding",
    "#api",
    "#ml",
];

pub const DEFAULT_STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "because", "before", "being",
    "below", "between", "could", "doing", "during", "every", "further", "having",
    "other", "ought", "their", "theirs", "there", "these", "those", "through",
    "under", "until", "which", "while", "would", "should", "where", "whose",
    "yourself", "itself", "myself", "themselves", "something", "anything",
    "using", "within", "without", "still", "might", "shall", "first", "since",
];

pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".bak",
    ".orig",
    "~",
    ".ipynb_checkpoints",
    "node_modules",
    "archive",
    ".deprecated.",
];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Greedy,
    Transitive,
}

/// Everything a run needs, passed explicitly into each component.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub roots: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub exclude: Vec<String>,
    pub threshold: f64,
    pub force: bool,
    pub verbose: bool,
    pub system_tags: Vec<String>,
    pub stopwords: Vec<String>,
    pub max_keywords: usize,
    pub min_keyword_len: usize,
    pub oversized_bytes: u64,
    pub section_similarity: f64,
    pub archive_dir: Option<PathBuf>,
    pub ledger_dir: Option<PathBuf>,
    pub strategy: StrategyKind,
    pub lock: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
            extensions: vec!["md".into(), "txt".into(), "rst".into()],
            exclude: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            threshold: 0.75,
            force: false,
            verbose: false,
            system_tags: DEFAULT_SYSTEM_TAGS.iter().map(|s| s.to_string()).collect(),
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            max_keywords: 20,
            min_keyword_len: 5,
            oversized_bytes: DEFAULT_OVERSIZED_BYTES,
            section_similarity: 0.7,
            archive_dir: None,
            ledger_dir: None,
            strategy: StrategyKind::Greedy,
            lock: true,
        }
    }
}

impl EngineConfig {
    /// Build a config with a custom tag vocabulary and defaults elsewhere.
    pub fn with_system_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            system_tags: tags.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Load from a TOML file. A missing file at the default location yields
    /// defaults; a missing file that was asked for explicitly is an error.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        if !path.exists() {
            if explicit {
                return Err(ConsolidateError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|e| ConsolidateError::io(path, e))?;
        let config: EngineConfig =
            toml::from_str(&raw).map_err(|source| ConsolidateError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConsolidateError::Config(format!(
                "threshold must be within 0.0..=1.0, got {}",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.section_similarity) {
            return Err(ConsolidateError::Config(format!(
                "section_similarity must be within 0.0..=1.0, got {}",
                self.section_similarity
            )));
        }
        if self.extensions.is_empty() {
            return Err(ConsolidateError::Config("no file extensions configured".into()));
        }
        if self.roots.is_empty() {
            return Err(ConsolidateError::Config("no document roots configured".into()));
        }
        if self.system_tags.iter().any(|t| t.trim().is_empty()) {
            return Err(ConsolidateError::Config("empty system tag in vocabulary".into()));
        }
        Ok(())
    }

    /// Parse a comma-separated extension list the way the CLI accepts it.
    pub fn set_extensions(&mut self, types: &str) {
        self.extensions = types
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    pub fn primary_root(&self) -> &Path {
        self.roots
            .first()
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new("."))
    }

    pub fn archive_root(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.primary_root().join("archive"))
    }

    pub fn ledger_root(&self) -> PathBuf {
        self.ledger_dir.clone().unwrap_or_else(|| self.archive_root())
    }

    pub fn stopword_set(&self) -> HashSet<String> {
        self.stopwords.iter().map(|w| w.to_lowercase()).collect()
    }
}
