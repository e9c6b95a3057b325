use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;
use tracing::debug;

use crate::cluster::Cluster;
use crate::document::Document;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}#{1,6}\s+(.+?)\s*#*\s*$").unwrap());
static CITATION_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[\d+\]").unwrap());
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9]+").unwrap());

/// Heading used for text that precedes the first heading.
pub const IMPLICIT_HEADING: &str = "Content";

pub const SKIPPED_RESOLUTION: &str = "skipped detailed merge";

const CITATION_HEADINGS: &[&str] = &["sources", "references", "citations"];

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub heading: String,
    pub body: String,
    pub source: String,
    pub had_conflict: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Conflict {
    pub heading: String,
    pub sources: Vec<String>,
    pub resolution: String,
}

#[derive(Debug, Clone)]
pub struct MergeResult {
    pub content: String,
    pub conflicts: Vec<Conflict>,
    pub degraded: bool,
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

fn is_citation_heading(heading: &str) -> bool {
    let lower = heading.trim().trim_end_matches(':').trim_end().to_lowercase();
    CITATION_HEADINGS.contains(&lower.as_str())
}

/// Strip leading and trailing blank lines, keep inner layout.
fn tidy_body(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].join("\n"),
        _ => String::new(),
    }
}

/// Split on heading lines outside code fences. Text before the first heading
/// becomes an implicit `Content` section. A heading repeated within one
/// document is folded into its first occurrence.
pub fn split_sections(content: &str, source: &str) -> Vec<Section> {
    let mut raw: Vec<(String, Vec<&str>)> = vec![(IMPLICIT_HEADING.to_string(), Vec::new())];
    let mut in_fence = false;

    for line in content.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some(caps) = HEADING_RE.captures(line) {
                let heading = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                raw.push((heading.to_string(), Vec::new()));
                continue;
            }
        }
        if let Some((_, body)) = raw.last_mut() {
            body.push(line);
        }
    }

    let mut sections: Vec<Section> = Vec::new();
    for (index, (heading, lines)) in raw.into_iter().enumerate() {
        let body = tidy_body(&lines);
        if index == 0 && body.is_empty() {
            continue;
        }
        if let Some(existing) = sections.iter_mut().find(|s| s.heading == heading) {
            if !body.is_empty() {
                if !existing.body.is_empty() {
                    existing.body.push_str("\n\n");
                }
                existing.body.push_str(&body);
            }
            continue;
        }
        sections.push(Section {
            heading,
            body,
            source: source.to_string(),
            had_conflict: false,
        });
    }

    sections
}

/// Lowercase words longer than three characters.
pub fn word_set(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.len() > 3)
        .map(str::to_string)
        .collect()
}

pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Citation lines: an explicit Sources/References/Citations block wins,
/// otherwise bracket-numbered lines anywhere in the text.
pub fn extract_citations(content: &str) -> Vec<String> {
    let explicit: Vec<String> = split_sections(content, "")
        .into_iter()
        .filter(|s| is_citation_heading(&s.heading))
        .flat_map(|s| {
            s.body
                .lines()
                .map(strip_list_marker)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();

    if !explicit.is_empty() {
        return explicit;
    }

    content
        .lines()
        .filter(|l| CITATION_LINE_RE.is_match(l))
        .map(|l| strip_list_marker(l).to_string())
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let t = line.trim();
    t.strip_prefix(['-', '*', '+']).map(str::trim_start).unwrap_or(t)
}

/// Merges sections keyed by heading, recording every dissimilar overlap.
struct SectionMerger {
    sections: BTreeMap<String, Section>,
    conflicts: Vec<Conflict>,
    similarity_threshold: f64,
}

impl SectionMerger {
    fn new(similarity_threshold: f64) -> Self {
        Self {
            sections: BTreeMap::new(),
            conflicts: Vec::new(),
            similarity_threshold,
        }
    }

    fn absorb(&mut self, incoming: Section) {
        if is_citation_heading(&incoming.heading) {
            return;
        }

        let Some(existing) = self.sections.get_mut(&incoming.heading) else {
            self.sections.insert(incoming.heading.clone(), incoming);
            return;
        };

        if incoming.body.trim().is_empty() || existing.body.trim() == incoming.body.trim() {
            return;
        }

        let similarity = jaccard_similarity(&word_set(&existing.body), &word_set(&incoming.body));
        if similarity >= self.similarity_threshold {
            debug!(heading = %incoming.heading, similarity, "near-duplicate section kept once");
            return;
        }

        existing.body.push_str(&format!(
            "\n\n> **Alternative content from `{}`:**\n\n{}",
            incoming.source, incoming.body
        ));
        existing.had_conflict = true;
        self.conflicts.push(Conflict {
            heading: incoming.heading.clone(),
            sources: vec![existing.source.clone(), incoming.source.clone()],
            resolution: format!("kept both versions (similarity {:.2})", similarity),
        });
    }

    fn skip(&mut self, doc: &Document) {
        self.conflicts.push(Conflict {
            heading: "(entire document)".to_string(),
            sources: vec![doc.name.clone()],
            resolution: SKIPPED_RESOLUTION.to_string(),
        });
    }
}

fn render_citations(out: &mut String, citations: &[String]) {
    if citations.is_empty() {
        return;
    }
    out.push_str("## Sources\n\n");
    for line in citations {
        out.push_str(&format!("- {}\n", line));
    }
    out.push('\n');
}

/// Merge a cluster into one document anchored on `cluster.base`.
/// An oversized base produces a degraded summary instead of a section merge.
pub fn merge_cluster(
    cluster: &Cluster,
    title: &str,
    similarity_threshold: f64,
    size_limit: u64,
    today: NaiveDate,
) -> MergeResult {
    if cluster.base.is_oversized() {
        return degraded_merge(cluster, title, size_limit, today);
    }

    let mut merger = SectionMerger::new(similarity_threshold);
    let base_text = cluster.base.content.as_deref().unwrap_or("");
    for section in split_sections(base_text, &cluster.base.name) {
        merger.absorb(section);
    }

    for doc in &cluster.related {
        match doc.content.as_deref() {
            Some(text) if doc.is_mergeable() => {
                for section in split_sections(text, &doc.name) {
                    merger.absorb(section);
                }
            }
            _ => merger.skip(doc),
        }
    }

    let mut seen = HashSet::new();
    let citations: Vec<String> = cluster
        .members()
        .filter_map(|d| d.content.as_deref())
        .flat_map(extract_citations)
        .filter(|c| seen.insert(c.clone()))
        .collect();

    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", title));
    out.push_str(&format!(
        "> **Consolidated document** merged from {} source files on {}.\n\n",
        cluster.len(),
        today.format("%Y-%m-%d")
    ));

    out.push_str("## Source Files\n\n");
    for doc in cluster.members() {
        if std::ptr::eq(doc, cluster.base) {
            out.push_str(&format!("- `{}` (base)\n", doc.name));
        } else {
            out.push_str(&format!("- `{}`\n", doc.name));
        }
    }
    out.push('\n');

    if !merger.conflicts.is_empty() {
        out.push_str("## Merge Conflicts\n\n");
        for conflict in &merger.conflicts {
            out.push_str(&format!(
                "- **{}**: {} ({})\n",
                conflict.heading,
                conflict.sources.join(", "),
                conflict.resolution
            ));
        }
        out.push('\n');
    }

    for section in merger.sections.values() {
        out.push_str(&format!("## {}\n\n", section.heading));
        if !section.body.is_empty() {
            out.push_str(&section.body);
            out.push_str("\n\n");
        }
    }

    render_citations(&mut out, &citations);

    MergeResult {
        content: format!("{}\n", out.trim_end()),
        conflicts: merger.conflicts,
        degraded: false,
    }
}

fn degraded_merge(cluster: &Cluster, title: &str, size_limit: u64, today: NaiveDate) -> MergeResult {
    let tags: BTreeSet<&str> = cluster
        .members()
        .flat_map(|d| d.tags.iter().map(String::as_str))
        .collect();

    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", title));
    out.push_str(&format!(
        "> **Consolidated document (large-file mode)** generated on {}.\n\n",
        today.format("%Y-%m-%d")
    ));
    out.push_str(&format!(
        "Full content merging was skipped due to file size: at least one source exceeds {} bytes.\n\n",
        size_limit
    ));

    out.push_str("## Source Files\n\n");
    for doc in cluster.members() {
        out.push_str(&format!("- `{}`\n", doc.name));
    }
    out.push('\n');

    out.push_str("## System Tags\n\n");
    if tags.is_empty() {
        out.push_str("- (none observed)\n");
    } else {
        for tag in tags {
            out.push_str(&format!("- {}\n", tag));
        }
    }

    MergeResult {
        content: out,
        conflicts: Vec::new(),
        degraded: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fixtures::{doc, oversized};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn test_split_sections() {
        let text = "intro line\n\n# Setup\nstep one\n\n## Usage\nrun it\n```\n# not a heading\n```\n";
        let sections = split_sections(text, "a.md");
        let headings: Vec<&str> = sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["Content", "Setup", "Usage"]);
        assert_eq!(sections[0].body, "intro line");
        assert!(sections[2].body.contains("# not a heading"));
        assert!(sections.iter().all(|s| s.source == "a.md"));
    }

    #[test]
    fn test_split_sections_without_preamble() {
        let sections = split_sections("# Only\nbody", "a.md");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, "Only");
    }

    #[test]
    fn test_split_sections_folds_repeated_heading() {
        let sections = split_sections("## Notes\nfirst\n## Other\nx\n## Notes\nsecond", "a.md");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].body, "first\n\nsecond");
    }

    #[test]
    fn test_jaccard_similarity() {
        let a = word_set("alpha beta gamma the");
        let b = word_set("beta gamma delta and");
        assert!((jaccard_similarity(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(jaccard_similarity(&HashSet::new(), &HashSet::new()), 0.0);
        assert_eq!(jaccard_similarity(&a, &a), 1.0);
    }

    #[test]
    fn test_extract_citations_prefers_explicit_block() {
        let text = "# Body\nsee [1] below\n\n## References\n- RFC 9110\n- RFC 9111\n";
        assert_eq!(extract_citations(text), vec!["RFC 9110", "RFC 9111"]);

        let loose = "# Body\ntext\n[1] Knuth, TAOCP\n[2] Sedgewick\n";
        assert_eq!(extract_citations(loose), vec!["[1] Knuth, TAOCP", "[2] Sedgewick"]);

        let colon = "## References:\n- RFC 9110\n";
        assert_eq!(extract_citations(colon), vec!["RFC 9110"]);
    }

    #[test]
    fn test_heading_starting_with_sources_is_a_regular_section() {
        assert!(is_citation_heading("Sources"));
        assert!(is_citation_heading(" references: "));
        assert!(!is_citation_heading("Sources of Truth"));
        assert!(!is_citation_heading("References to the API"));
        assert!(!is_citation_heading("Citations policy"));

        let base = doc(
            "a.md",
            &[],
            &[],
            Some("## Sources of Truth\n\nConfig lives in\n```\nsettings.toml\n```\n"),
        );
        let other = doc("b.md", &[], &[], Some("## Usage\nrun it\n"));
        let cluster = Cluster {
            base: &base,
            related: vec![&other],
            reasons: vec![],
        };
        let content = merge_cluster(&cluster, "Title", 0.7, 100, today()).content;

        assert!(content.contains("## Sources of Truth\n\nConfig lives in\n```\nsettings.toml\n```\n"));
        assert!(!content.contains("## Sources\n"));
        assert!(!content.contains("- ```"));
    }

    #[test]
    fn test_near_duplicate_sections_kept_once() {
        let base = doc(
            "a.md",
            &[],
            &[],
            Some("## Install\nRun cargo install docfold then configure roots properly.\n"),
        );
        let other = doc(
            "b.md",
            &[],
            &[],
            Some("## Install\nRun cargo install docfold then configure roots properly today.\n"),
        );
        let cluster = Cluster {
            base: &base,
            related: vec![&other],
            reasons: vec![],
        };
        let result = merge_cluster(&cluster, "Install Guide", 0.7, 100, today());

        assert!(result.conflicts.is_empty());
        assert!(!result.degraded);
        assert_eq!(result.content.matches("## Install").count(), 1);
        assert!(!result.content.contains("Alternative content"));
    }

    #[test]
    fn test_dissimilar_sections_keep_both_versions() {
        let base = doc("a.md", &[], &[], Some("## Deploy\nPush the container image to staging first.\n"));
        let other = doc("b.md", &[], &[], Some("## Deploy\nUpload artifacts through the release pipeline.\n## Extra\nunique\n"));
        let cluster = Cluster {
            base: &base,
            related: vec![&other],
            reasons: vec![],
        };
        let result = merge_cluster(&cluster, "Deploy", 0.7, 100, today());

        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].heading, "Deploy");
        assert_eq!(result.conflicts[0].sources, vec!["a.md", "b.md"]);
        assert!(result.content.contains("Push the container image"));
        assert!(result.content.contains("Alternative content from `b.md`"));
        assert!(result.content.contains("Upload artifacts"));
        assert!(result.content.contains("## Extra\n\nunique"));
        assert!(result.content.contains("## Merge Conflicts"));
    }

    #[test]
    fn test_sections_sorted_and_layout_order() {
        let base = doc("a.md", &[], &[], Some("## Zeta\nz body\n## Alpha\na body\n[1] Paper one\n"));
        let other = doc("b.md", &[], &[], Some("## Middle\nm body\n## Sources\n- [1] Paper one\n- Book two\n"));
        let cluster = Cluster {
            base: &base,
            related: vec![&other],
            reasons: vec![],
        };
        let content = merge_cluster(&cluster, "Title", 0.7, 100, today()).content;

        let pos = |needle: &str| content.find(needle).unwrap();
        assert!(content.starts_with("# Title\n\n> **Consolidated document** merged from 2 source files on 2025-03-14."));
        assert!(pos("## Source Files") < pos("## Alpha"));
        assert!(pos("## Alpha") < pos("## Middle"));
        assert!(pos("## Middle") < pos("## Zeta"));
        assert!(pos("## Zeta") < pos("## Sources\n"));
        assert!(content.contains("- `a.md` (base)"));
        assert!(content.contains("## Sources\n\n- [1] Paper one\n- Book two\n"));
        assert_eq!(content.matches("[1] Paper one").count(), 2);
        assert_eq!(content.matches("## Sources\n").count(), 1);
    }

    #[test]
    fn test_skipped_members_are_recorded() {
        let base = doc("a.md", &[], &[], Some("## One\ntext\n"));
        let big = oversized("big.md", &[], &[]);
        let mut broken = doc("broken.md", &[], &[], None);
        broken.extraction_error = Some("denied".into());
        let cluster = Cluster {
            base: &base,
            related: vec![&big, &broken],
            reasons: vec![],
        };
        let result = merge_cluster(&cluster, "T", 0.7, 100, today());

        assert_eq!(result.conflicts.len(), 2);
        assert!(result.conflicts.iter().all(|c| c.resolution == SKIPPED_RESOLUTION));
        assert_eq!(result.conflicts[0].sources, vec!["big.md"]);
        assert!(result.content.contains("- `big.md`"));
    }

    #[test]
    fn test_oversized_base_degrades() {
        let big = oversized("dump.md", &["#ml"], &[]);
        let small = doc("notes.md", &["#security"], &[], Some("## Secret\nkeep\n"));
        let cluster = Cluster {
            base: &big,
            related: vec![&small],
            reasons: vec![],
        };
        let result = merge_cluster(&cluster, "Dump", 0.7, 1024, today());

        assert!(result.degraded);
        assert!(result.content.contains("skipped due to file size"));
        assert!(result.content.contains("- `dump.md`\n- `notes.md`"));
        assert!(result.content.contains("- #ml\n- #security"));
        assert!(!result.content.contains("## Secret"));
    }

    #[test]
    fn test_no_dissimilar_heading_disappears() {
        let base = doc("a.md", &[], &[], Some("## Shared\nfirst wording entirely\n## Solo\nbase only\n"));
        let b = doc("b.md", &[], &[], Some("## Shared\nsecond phrasing completely\n## Fresh\nnew stuff\n"));
        let c = doc("c.md", &[], &[], Some("## Shared\nthird variation altogether\n"));
        let cluster = Cluster {
            base: &base,
            related: vec![&b, &c],
            reasons: vec![],
        };
        let result = merge_cluster(&cluster, "T", 0.7, 100, today());
        for needle in ["first wording", "second phrasing", "third variation", "base only", "new stuff"] {
            assert!(result.content.contains(needle), "lost {needle}");
        }
        assert_eq!(result.conflicts.len(), 2);
    }
}
