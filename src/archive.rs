use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{ConsolidateError, Result};
use crate::ledger::Ledger;
use crate::plan::{ArchiveAction, ClusterPlan, ConsolidationPlan};

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ClusterOutcome {
    Written {
        canonical: PathBuf,
        archived: usize,
        conflicts: usize,
        degraded: bool,
    },
    Failed {
        canonical: PathBuf,
        reason: String,
    },
}

impl ClusterOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, ClusterOutcome::Written { .. })
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ConsolidateError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Banner first, then the original bytes streamed across, then the original
/// is removed. Oversized files never pass through memory whole.
pub fn archive_file(action: &ArchiveAction) -> Result<()> {
    ensure_parent(&action.destination)?;

    let mut source =
        File::open(&action.source).map_err(|e| ConsolidateError::io(&action.source, e))?;
    let mut dest = File::create(&action.destination)
        .map_err(|e| ConsolidateError::io(&action.destination, e))?;

    dest.write_all(action.banner.as_bytes())
        .map_err(|e| ConsolidateError::io(&action.destination, e))?;
    io::copy(&mut source, &mut dest).map_err(|e| ConsolidateError::io(&action.destination, e))?;
    dest.flush()
        .map_err(|e| ConsolidateError::io(&action.destination, e))?;
    drop(dest);

    fs::remove_file(&action.source).map_err(|e| ConsolidateError::io(&action.source, e))?;
    Ok(())
}

/// Write the canonical file, archive every superseded member, then log.
pub fn apply_cluster(plan: &ClusterPlan, ledger: &Ledger) -> Result<()> {
    ensure_parent(&plan.canonical_path)?;
    fs::write(&plan.canonical_path, &plan.content)
        .map_err(|e| ConsolidateError::io(&plan.canonical_path, e))?;

    for action in &plan.archives {
        archive_file(action)?;
    }

    ledger.append(&plan.detail, &plan.summary)
}

/// Apply every cluster in order. A failure stops only its own cluster.
pub fn apply_plan(plan: &ConsolidationPlan, ledger: &Ledger) -> Vec<ClusterOutcome> {
    plan.clusters
        .iter()
        .map(|cluster| match apply_cluster(cluster, ledger) {
            Ok(()) => {
                info!(
                    canonical = %cluster.canonical_path.display(),
                    archived = cluster.archives.len(),
                    conflicts = cluster.conflicts.len(),
                    "cluster consolidated"
                );
                ClusterOutcome::Written {
                    canonical: cluster.canonical_path.clone(),
                    archived: cluster.archives.len(),
                    conflicts: cluster.conflicts.len(),
                    degraded: cluster.degraded,
                }
            }
            Err(e) => {
                warn!(
                    canonical = %cluster.canonical_path.display(),
                    error = %e,
                    "cluster failed, continuing with the next one"
                );
                ClusterOutcome::Failed {
                    canonical: cluster.canonical_path.clone(),
                    reason: e.to_string(),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{DetailRecord, SummaryRecord};
    use chrono::Utc;

    fn cluster_plan(dir: &Path, canonical: &str, sources: &[&str]) -> ClusterPlan {
        let now = Utc::now();
        ClusterPlan {
            canonical_path: dir.join(canonical),
            canonical_name: canonical.to_string(),
            base: dir.join(sources[0]),
            related: sources[1..].iter().map(|s| dir.join(s)).collect(),
            reasons: vec![],
            content: "# Merged\n".to_string(),
            conflicts: vec![],
            degraded: false,
            archives: sources
                .iter()
                .map(|s| ArchiveAction {
                    source: dir.join(s),
                    destination: dir.join("archive").join(crate::plan::deprecated_name(s)),
                    banner: format!("> **Deprecated – merged into {canonical}** (today)\n\n"),
                })
                .collect(),
            detail: DetailRecord {
                timestamp: now,
                canonical: canonical.to_string(),
                base: sources[0].to_string(),
                related: vec![],
                reasons: vec![],
                conflicts: vec![],
                degraded: false,
            },
            summary: SummaryRecord {
                timestamp: now,
                canonical: canonical.to_string(),
                members: sources.len(),
                conflicts: 0,
                degraded: false,
            },
        }
    }

    #[test]
    fn test_archive_file_prepends_banner_and_removes_original() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("old.md");
        fs::write(&source, "original body").unwrap();
        let action = ArchiveAction {
            source: source.clone(),
            destination: dir.path().join("archive/old.deprecated.md"),
            banner: "> **Deprecated – merged into new.md** (2025-01-01)\n\n".into(),
        };

        archive_file(&action).unwrap();

        assert!(!source.exists());
        let archived = fs::read_to_string(&action.destination).unwrap();
        assert_eq!(
            archived,
            "> **Deprecated – merged into new.md** (2025-01-01)\n\noriginal body"
        );
    }

    #[test]
    fn test_failed_cluster_does_not_stop_next() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("c.md"), "c").unwrap();
        fs::write(dir.path().join("d.md"), "d").unwrap();
        // a.md is missing, so the first cluster's archive step fails
        fs::write(dir.path().join("b.md"), "b").unwrap();

        let plan = ConsolidationPlan {
            clusters: vec![
                cluster_plan(dir.path(), "first-overview.md", &["a.md", "b.md"]),
                cluster_plan(dir.path(), "second-overview.md", &["c.md", "d.md"]),
            ],
        };
        let ledger = Ledger::new(dir.path().join("archive"));
        let outcomes = apply_plan(&plan, &ledger);

        assert!(matches!(outcomes[0], ClusterOutcome::Failed { .. }));
        assert!(outcomes[1].is_written());
        assert!(dir.path().join("second-overview.md").exists());
        assert!(!dir.path().join("c.md").exists());
        assert!(dir.path().join("archive/d.deprecated.md").exists());

        let summary = fs::read_to_string(ledger.summary_path()).unwrap();
        assert_eq!(summary.lines().count(), 1);
        assert!(summary.contains("second-overview.md"));
    }
}
