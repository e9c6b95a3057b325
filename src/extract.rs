use ahash::AHashMap;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::document::{Document, SizeClass};
use crate::loader::Candidate;
use crate::probe::ContentProbe;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z][a-z0-9]*").unwrap());

/// Derives tags and keywords for each discovered file.
pub struct Extractor<'a> {
    config: &'a EngineConfig,
    stopwords: HashSet<String>,
    probe: &'a dyn ContentProbe,
}

impl<'a> Extractor<'a> {
    pub fn new(config: &'a EngineConfig, probe: &'a dyn ContentProbe) -> Self {
        Self {
            config,
            stopwords: config.stopword_set(),
            probe,
        }
    }

    /// Never fails: any read or probe problem lands in `extraction_error`.
    pub fn extract(&self, candidate: &Candidate) -> Document {
        let path = &candidate.path;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut doc = Document {
            path: path.clone(),
            name,
            tags: BTreeSet::new(),
            keywords: Vec::new(),
            last_modified: DateTime::<Utc>::from(SystemTime::UNIX_EPOCH),
            content: None,
            size_class: candidate.size_class,
            extraction_error: None,
        };

        if let Err(e) = self.fill(&mut doc) {
            warn!(path = %path.display(), error = %e, "extraction failed, continuing");
            doc.tags.clear();
            doc.keywords.clear();
            doc.content = None;
            doc.extraction_error = Some(e.to_string());
        } else {
            debug!(
                path = %path.display(),
                tags = doc.tags.len(),
                keywords = doc.keywords.len(),
                oversized = doc.is_oversized(),
                "extracted"
            );
        }

        doc
    }

    fn fill(&self, doc: &mut Document) -> std::io::Result<()> {
        let mtime = fs::metadata(&doc.path)?.modified()?;
        doc.last_modified = DateTime::<Utc>::from(mtime);
        match doc.size_class {
            SizeClass::Normal => self.fill_from_content(doc),
            SizeClass::Oversized => self.fill_from_probe(doc),
        }
    }

    fn fill_from_content(&self, doc: &mut Document) -> std::io::Result<()> {
        let content = fs::read_to_string(&doc.path)?;
        doc.tags = self.tags_in(&content);
        doc.keywords = self.content_keywords(&content);
        self.append_filename_keywords(doc);
        doc.content = Some(content);
        Ok(())
    }

    fn fill_from_probe(&self, doc: &mut Document) -> std::io::Result<()> {
        for tag in &self.config.system_tags {
            if self.probe.has_pattern(&doc.path, tag)? {
                doc.tags.insert(tag.clone());
            }
        }
        self.append_filename_keywords(doc);
        Ok(())
    }

    /// Exact substring membership against the tag vocabulary.
    pub fn tags_in(&self, content: &str) -> BTreeSet<String> {
        self.config
            .system_tags
            .iter()
            .filter(|tag| content.contains(tag.as_str()))
            .cloned()
            .collect()
    }

    fn is_keyword(&self, word: &str) -> bool {
        word.chars().count() >= self.config.min_keyword_len && !self.stopwords.contains(word)
    }

    /// Top content tokens by frequency; ties keep first-seen order.
    pub fn content_keywords(&self, content: &str) -> Vec<String> {
        let lowered = content.to_lowercase();
        let mut counts: AHashMap<&str, (usize, usize)> = AHashMap::new();

        for (position, m) in WORD_RE.find_iter(&lowered).enumerate() {
            let word = m.as_str();
            if !self.is_keyword(word) {
                continue;
            }
            counts.entry(word).or_insert((0, position)).0 += 1;
        }

        let mut ranked: Vec<(&str, usize, usize)> =
            counts.into_iter().map(|(w, (n, first))| (w, n, first)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        ranked
            .into_iter()
            .take(self.config.max_keywords)
            .map(|(w, _, _)| w.to_string())
            .collect()
    }

    /// Filename tokens go through the same keyword filter so the keyword set
    /// never holds short words or stopwords.
    fn append_filename_keywords(&self, doc: &mut Document) {
        for token in filename_tokens(&doc.path) {
            if self.is_keyword(&token) && !doc.keywords.contains(&token) {
                doc.keywords.push(token);
            }
        }
    }
}

/// Stem split on separators, lowercased, tokens longer than three characters.
pub fn filename_tokens(path: &Path) -> Vec<String> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    stem.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() > 3)
        .map(str::to_string)
        .collect()
}
