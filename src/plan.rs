use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cluster::Cluster;
use crate::config::EngineConfig;
use crate::ledger::{DetailRecord, SummaryRecord};
use crate::merge::{merge_cluster, Conflict};
use crate::naming::{canonical_name, title_from, with_counter};
use crate::select::select_base;

/// Copy `source` to `destination` with `banner` prepended, then remove `source`.
#[derive(Debug, Clone)]
pub struct ArchiveAction {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub banner: String,
}

/// Everything needed to apply one cluster, computed without writing.
#[derive(Debug, Clone)]
pub struct ClusterPlan {
    pub canonical_path: PathBuf,
    pub canonical_name: String,
    pub base: PathBuf,
    pub related: Vec<PathBuf>,
    pub reasons: Vec<String>,
    pub content: String,
    pub conflicts: Vec<Conflict>,
    pub degraded: bool,
    pub archives: Vec<ArchiveAction>,
    pub detail: DetailRecord,
    pub summary: SummaryRecord,
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidationPlan {
    pub clusters: Vec<ClusterPlan>,
}

impl ConsolidationPlan {
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// `guide.md` -> `guide.deprecated.md`; `notes` -> `notes.deprecated`.
pub fn deprecated_name(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => format!("{}.deprecated{}", &file_name[..idx], &file_name[idx..]),
        _ => format!("{file_name}.deprecated"),
    }
}

pub fn deprecation_banner(canonical: &str, now: DateTime<Utc>) -> String {
    format!(
        "> **Deprecated – merged into {}** ({})\n\n",
        canonical,
        now.format("%Y-%m-%d")
    )
}

/// Picks names that neither exist on disk nor were claimed earlier in the run.
struct PathClaims {
    claimed: HashSet<PathBuf>,
}

impl PathClaims {
    fn new() -> Self {
        Self {
            claimed: HashSet::new(),
        }
    }

    fn is_free(&self, path: &Path, reusable: &[&Path]) -> bool {
        if self.claimed.contains(path) {
            return false;
        }
        reusable.contains(&path) || !path.exists()
    }

    /// `make(n)` builds the n-th candidate name, starting at 1.
    fn claim(&mut self, dir: &Path, reusable: &[&Path], make: impl Fn(usize) -> String) -> PathBuf {
        let mut counter = 1;
        loop {
            let candidate = dir.join(make(counter));
            if self.is_free(&candidate, reusable) {
                self.claimed.insert(candidate.clone());
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Build the write/archive/log plan for every cluster, in cluster order.
pub fn plan_clusters(clusters: Vec<Cluster>, config: &EngineConfig, now: DateTime<Utc>) -> ConsolidationPlan {
    let archive_root = config.archive_root();
    let mut claims = PathClaims::new();
    let mut plans = Vec::with_capacity(clusters.len());

    for cluster in clusters {
        let cluster = select_base(cluster, now);
        let degraded = cluster.base.is_oversized();
        // only a member whose content lands in the merge may be overwritten
        let reusable: Vec<&Path> = cluster
            .members()
            .filter(|d| d.is_mergeable())
            .map(|d| d.path.as_path())
            .collect();

        let name = canonical_name(&cluster, degraded);
        let dir = cluster
            .base
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.primary_root().to_path_buf());
        let canonical_path = claims.claim(&dir, &reusable, |n| {
            if n == 1 {
                name.clone()
            } else {
                with_counter(&name, n)
            }
        });
        let canonical_name = canonical_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| name.clone());

        let merged = merge_cluster(
            &cluster,
            &title_from(&canonical_name),
            config.section_similarity,
            config.oversized_bytes,
            now.date_naive(),
        );

        let banner = deprecation_banner(&canonical_name, now);
        let archives: Vec<ArchiveAction> = cluster
            .members()
            .filter(|d| d.path != canonical_path)
            .map(|d| {
                let archived = deprecated_name(&d.name);
                let destination = claims.claim(&archive_root, &[], |n| {
                    if n == 1 {
                        archived.clone()
                    } else {
                        deprecated_name(&with_counter_any(&d.name, n))
                    }
                });
                ArchiveAction {
                    source: d.path.clone(),
                    destination,
                    banner: banner.clone(),
                }
            })
            .collect();

        let related_names: Vec<String> = cluster.related.iter().map(|d| d.name.clone()).collect();
        let detail = DetailRecord {
            timestamp: now,
            canonical: canonical_name.clone(),
            base: cluster.base.name.clone(),
            related: related_names,
            reasons: cluster.reasons.clone(),
            conflicts: merged.conflicts.clone(),
            degraded: merged.degraded,
        };
        let summary = SummaryRecord {
            timestamp: now,
            canonical: canonical_name.clone(),
            members: cluster.len(),
            conflicts: merged.conflicts.len(),
            degraded: merged.degraded,
        };

        debug!(
            canonical = %canonical_path.display(),
            base = %cluster.base.name,
            archives = archives.len(),
            "cluster planned"
        );

        plans.push(ClusterPlan {
            canonical_path,
            canonical_name,
            base: cluster.base.path.clone(),
            related: cluster.related.iter().map(|d| d.path.clone()).collect(),
            reasons: cluster.reasons,
            content: merged.content,
            conflicts: merged.conflicts,
            degraded: merged.degraded,
            archives,
            detail,
            summary,
        });
    }

    info!(clusters = plans.len(), "plan complete");
    ConsolidationPlan { clusters: plans }
}

/// `notes.txt` -> `notes-2.txt`, any extension.
fn with_counter_any(file_name: &str, counter: usize) -> String {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => format!("{}-{}{}", &file_name[..idx], counter, &file_name[idx..]),
        _ => format!("{file_name}-{counter}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fixtures::{doc, oversized};
    use crate::document::Document;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 2, 9, 30, 0).unwrap()
    }

    fn config_in(dir: &Path) -> EngineConfig {
        EngineConfig {
            roots: vec![dir.to_path_buf()],
            ..EngineConfig::default()
        }
    }

    fn placed(mut d: Document, dir: &Path) -> Document {
        d.path = dir.join(&d.name);
        d
    }

    #[test]
    fn test_deprecated_name() {
        assert_eq!(deprecated_name("guide.md"), "guide.deprecated.md");
        assert_eq!(deprecated_name("a.b.txt"), "a.b.deprecated.txt");
        assert_eq!(deprecated_name("README"), "README.deprecated");
        assert_eq!(with_counter_any("notes.txt", 2), "notes-2.txt");
    }

    #[test]
    fn test_banner_text() {
        assert_eq!(
            deprecation_banner("api-guide.md", now()),
            "> **Deprecated – merged into api-guide.md** (2025-05-02)\n\n"
        );
    }

    #[test]
    fn test_plan_shapes_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let a = placed(doc("firebase-auth-notes.md", &["#firebase"], &["tokens"], Some("## Login\nuse tokens\n")), dir.path());
        let b = placed(
            doc("firebase-security-notes.md", &["#firebase", "#security"], &["rules"], Some("## Rules\nlock it down\n")),
            dir.path(),
        );
        let clusters = vec![Cluster {
            base: &a,
            related: vec![&b],
            reasons: vec!["firebase-security-notes.md: shared tags: #firebase".into()],
        }];

        let config = config_in(dir.path());
        let plan = plan_clusters(clusters, &config, now());
        assert_eq!(plan.clusters.len(), 1);
        let p = &plan.clusters[0];

        assert_eq!(p.canonical_name, "firebase-security-overview.md");
        assert_eq!(p.canonical_path, dir.path().join("firebase-security-overview.md"));
        assert_eq!(p.archives.len(), 2);
        assert!(p.archives.iter().all(|a| a.destination.starts_with(dir.path().join("archive"))));
        assert!(p.archives[0].banner.contains("merged into firebase-security-overview.md"));
        assert!(p.content.starts_with("# Firebase Security Overview"));
        assert_eq!(p.summary.members, 2);
        assert_eq!(p.detail.reasons.len(), 1);
        // nothing written during planning
        assert!(!p.canonical_path.exists());
    }

    #[test]
    fn test_name_collision_with_outside_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("api-overview.md"), "unrelated").unwrap();
        let a = placed(doc("a.md", &["#api"], &[], Some("x")), dir.path());
        let b = placed(doc("b.md", &["#api"], &[], Some("y")), dir.path());
        let clusters = vec![Cluster {
            base: &a,
            related: vec![&b],
            reasons: vec![],
        }];
        let plan = plan_clusters(clusters, &config_in(dir.path()), now());
        assert_eq!(plan.clusters[0].canonical_name, "api-overview-2.md");
    }

    #[test]
    fn test_member_at_canonical_path_is_not_archived() {
        let dir = tempfile::tempdir().unwrap();
        let a = placed(doc("api-overview.md", &["#api"], &[], Some("## A\nx\n")), dir.path());
        std::fs::write(&a.path, "x").unwrap();
        let b = placed(doc("b.md", &["#api"], &[], Some("## B\ny\n")), dir.path());
        let clusters = vec![Cluster {
            base: &a,
            related: vec![&b],
            reasons: vec![],
        }];
        let plan = plan_clusters(clusters, &config_in(dir.path()), now());
        let p = &plan.clusters[0];
        assert_eq!(p.canonical_path, a.path);
        assert_eq!(p.archives.len(), 1);
        assert_eq!(p.archives[0].source, b.path);
    }

    #[test]
    fn test_unmerged_member_at_canonical_path_is_archived() {
        let dir = tempfile::tempdir().unwrap();
        let big = placed(oversized("api-guide.md", &["#api"], &[]), dir.path());
        std::fs::write(&big.path, "#api payload").unwrap();
        let faq = placed(doc("faq.md", &["#api"], &[], Some("#api see faq\n")), dir.path());
        let clusters = vec![Cluster {
            base: &faq,
            related: vec![&big],
            reasons: vec![],
        }];

        let plan = plan_clusters(clusters, &config_in(dir.path()), now());
        let p = &plan.clusters[0];
        assert!(!p.degraded);
        assert_eq!(p.canonical_name, "api-guide-2.md");
        let sources: Vec<&Path> = p.archives.iter().map(|a| a.source.as_path()).collect();
        assert_eq!(sources.len(), 2);
        assert!(sources.contains(&big.path.as_path()));
        assert!(sources.contains(&faq.path.as_path()));
    }

    #[test]
    fn test_same_named_members_get_distinct_archives() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = oversized("dump.md", &[], &[]);
        first.path = dir.path().join("one/dump.md");
        let mut second = oversized("dump.md", &[], &[]);
        second.path = dir.path().join("two/dump.md");
        let clusters = vec![Cluster {
            base: &first,
            related: vec![&second],
            reasons: vec![],
        }];
        let plan = plan_clusters(clusters, &config_in(dir.path()), now());
        let p = &plan.clusters[0];
        assert!(p.degraded);
        assert!(p.canonical_name.ends_with("-large-file.md"));
        let dests: Vec<String> = p
            .archives
            .iter()
            .map(|a| a.destination.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(dests, vec!["dump.deprecated.md", "dump-2.deprecated.md"]);
    }
}
