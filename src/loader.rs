use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::config::EngineConfig;
use crate::document::SizeClass;
use crate::error::{ConsolidateError, Result};

/// A file that passed discovery, classified by size before any read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub bytes: u64,
    pub size_class: SizeClass,
}

/// Exclude list: literal names/suffixes/directory markers plus glob patterns.
#[derive(Debug)]
pub struct ExcludeSet {
    literals: Vec<String>,
    globs: GlobSet,
}

impl ExcludeSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut literals = Vec::new();
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            if pattern.contains(['*', '?', '[']) {
                let glob = Glob::new(pattern).map_err(|source| ConsolidateError::Exclude {
                    pattern: pattern.clone(),
                    source,
                })?;
                builder.add(glob);
            } else if !pattern.is_empty() {
                literals.push(pattern.clone());
            }
        }

        let globs = builder.build().map_err(|source| ConsolidateError::Exclude {
            pattern: patterns.join(","),
            source,
        })?;

        Ok(Self { literals, globs })
    }

    /// `path` is matched relative to the root it was found under.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.globs.is_match(path) {
            return true;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let path_str = path.to_string_lossy();

        self.literals.iter().any(|literal| {
            let component_hit = path.components().any(|c| match c {
                Component::Normal(part) => part.to_string_lossy() == literal.as_str(),
                _ => false,
            });
            component_hit
                || file_name.ends_with(literal.as_str())
                || (literal.starts_with('.') && literal.ends_with('.') && file_name.contains(literal.as_str()))
                || (literal.contains('/') && path_str.contains(literal.as_str()))
        })
    }
}

pub fn classify(bytes: u64, limit: u64) -> SizeClass {
    if bytes > limit {
        SizeClass::Oversized
    } else {
        SizeClass::Normal
    }
}

/// Walk every configured root and return eligible files in discovery order.
/// An empty result is not an error.
pub fn discover(config: &EngineConfig) -> Result<Vec<Candidate>> {
    let excludes = ExcludeSet::new(&config.exclude)?;
    let extensions: HashSet<String> = config.extensions.iter().map(|e| e.to_lowercase()).collect();

    // the archive is pruned by resolved location, not by name
    let archive_dir = fs::canonicalize(config.archive_root()).ok();

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut candidates = Vec::new();

    for root in &config.roots {
        let archive_dir = archive_dir.clone();
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                match &archive_dir {
                    Some(archive) if is_dir => fs::canonicalize(entry.path())
                        .map(|p| &p != archive)
                        .unwrap_or(true),
                    _ => true,
                }
            });

        for entry in builder.build().filter_map(|e| e.ok()) {
            let path = entry.path();

            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();
            if !extensions.contains(&ext) {
                continue;
            }

            let relative = path.strip_prefix(root).unwrap_or(path);
            if excludes.is_excluded(relative) {
                debug!(path = %path.display(), "excluded");
                continue;
            }

            if !seen.insert(path.to_path_buf()) {
                continue;
            }

            // Size comes from metadata only; oversized files are never read here.
            let bytes = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "metadata unavailable");
                    0
                }
            };

            candidates.push(Candidate {
                path: path.to_path_buf(),
                bytes,
                size_class: classify(bytes, config.oversized_bytes),
            });
        }
    }

    Ok(candidates)
}
