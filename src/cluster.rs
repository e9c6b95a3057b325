use std::collections::VecDeque;
use tracing::debug;

use crate::config::{EngineConfig, StrategyKind};
use crate::document::Document;
use crate::score::score;

/// A base document plus the documents slated to merge into it.
/// `related` is never empty.
#[derive(Debug, Clone)]
pub struct Cluster<'a> {
    pub base: &'a Document,
    pub related: Vec<&'a Document>,
    pub reasons: Vec<String>,
}

#[allow(clippy::len_without_is_empty)]
impl<'a> Cluster<'a> {
    /// Base first, then related in scan order.
    pub fn members(&self) -> impl Iterator<Item = &'a Document> + '_ {
        std::iter::once(self.base).chain(self.related.iter().copied())
    }

    pub fn len(&self) -> usize {
        1 + self.related.len()
    }
}

/// Groups documents into clusters. Implementations must be deterministic for
/// a given input order and config.
pub trait ClusterStrategy {
    fn name(&self) -> &'static str;

    fn build<'a>(&self, docs: &'a [Document], config: &EngineConfig) -> Vec<Cluster<'a>>;
}

pub fn strategy_for(kind: StrategyKind) -> Box<dyn ClusterStrategy> {
    match kind {
        StrategyKind::Greedy => Box::new(GreedyStrategy),
        StrategyKind::Transitive => Box::new(TransitiveStrategy),
    }
}

fn accepts(overlap: f64, config: &EngineConfig) -> bool {
    config.force || overlap >= config.threshold
}

/// One pass in discovery order, comparing every candidate only against the
/// document that opened the cluster. Not transitive: a document close to a
/// related member but not to the base stays out.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyStrategy;

impl ClusterStrategy for GreedyStrategy {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn build<'a>(&self, docs: &'a [Document], config: &EngineConfig) -> Vec<Cluster<'a>> {
        let mut processed = vec![false; docs.len()];
        let mut clusters = Vec::new();

        for (i, base) in docs.iter().enumerate() {
            if processed[i] {
                continue;
            }

            let mut related = Vec::new();
            let mut reasons = Vec::new();

            for (j, other) in docs.iter().enumerate() {
                if j == i || processed[j] {
                    continue;
                }
                let pair = score(base, other);
                debug!(
                    base = %base.name,
                    other = %other.name,
                    overlap = pair.overlap,
                    "pair scored"
                );
                if accepts(pair.overlap, config) {
                    processed[j] = true;
                    reasons.push(format!("{}: {}", other.name, pair.reason));
                    related.push(other);
                }
            }
            processed[i] = true;

            if !related.is_empty() {
                clusters.push(Cluster {
                    base,
                    related,
                    reasons,
                });
            }
        }

        clusters
    }
}

/// Breadth-first growth: a candidate joins if it is close enough to any
/// member already in the cluster.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransitiveStrategy;

impl ClusterStrategy for TransitiveStrategy {
    fn name(&self) -> &'static str {
        "transitive"
    }

    fn build<'a>(&self, docs: &'a [Document], config: &EngineConfig) -> Vec<Cluster<'a>> {
        let mut processed = vec![false; docs.len()];
        let mut clusters = Vec::new();

        for i in 0..docs.len() {
            if processed[i] {
                continue;
            }
            processed[i] = true;

            let mut related = Vec::new();
            let mut reasons = Vec::new();
            let mut frontier = VecDeque::from([i]);

            while let Some(m) = frontier.pop_front() {
                for j in 0..docs.len() {
                    if processed[j] {
                        continue;
                    }
                    let pair = score(&docs[m], &docs[j]);
                    if accepts(pair.overlap, config) {
                        processed[j] = true;
                        reasons.push(format!(
                            "{} (via {}): {}",
                            docs[j].name, docs[m].name, pair.reason
                        ));
                        related.push(&docs[j]);
                        frontier.push_back(j);
                    }
                }
            }

            if !related.is_empty() {
                clusters.push(Cluster {
                    base: &docs[i],
                    related,
                    reasons,
                });
            }
        }

        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fixtures::doc;

    fn names(cluster: &Cluster) -> Vec<String> {
        cluster.members().map(|d| d.name.clone()).collect()
    }

    /// A~B and B~C at 0.75+, A~C below.
    fn chain() -> Vec<Document> {
        vec![
            doc("a.md", &[], &["alpha", "bravo", "charlie", "delta"], None),
            doc("b.md", &[], &["alpha", "bravo", "charlie", "echo1", "foxtrot"], None),
            doc("c.md", &[], &["bravo", "charlie", "echo1", "foxtrot"], None),
        ]
    }

    #[test]
    fn test_chain_scores_as_expected() {
        let docs = chain();
        assert!(score(&docs[0], &docs[1]).overlap >= 0.75);
        assert!(score(&docs[1], &docs[2]).overlap >= 0.75);
        assert!(score(&docs[0], &docs[2]).overlap < 0.75);
    }

    #[test]
    fn test_greedy_is_not_transitive() {
        let docs = chain();
        let clusters = GreedyStrategy.build(&docs, &EngineConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(names(&clusters[0]), vec!["a.md", "b.md"]);
        assert_eq!(clusters[0].reasons.len(), 1);
        assert!(clusters[0].reasons[0].starts_with("b.md: shared keywords"));
    }

    #[test]
    fn test_transitive_pulls_in_chain() {
        let docs = chain();
        let clusters = TransitiveStrategy.build(&docs, &EngineConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(names(&clusters[0]), vec!["a.md", "b.md", "c.md"]);
    }

    #[test]
    fn test_greedy_groups_two_members_similar_only_to_base() {
        let docs = vec![
            doc("hub.md", &[], &["alpha", "bravo", "charlie", "delta"], None),
            doc("left.md", &[], &["alpha", "bravo", "charlie"], None),
            doc("right.md", &[], &["bravo", "charlie", "delta"], None),
        ];
        let clusters = GreedyStrategy.build(&docs, &EngineConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(names(&clusters[0]), vec!["hub.md", "left.md", "right.md"]);
    }

    #[test]
    fn test_lone_document_forms_no_cluster() {
        let docs = vec![doc("solo.md", &["#api"], &["alpha"], None)];
        assert!(GreedyStrategy.build(&docs, &EngineConfig::default()).is_empty());
    }

    #[test]
    fn test_below_threshold_stays_apart() {
        let docs = vec![
            doc("a.md", &[], &["alpha", "bravo", "charlie", "delta"], None),
            doc("b.md", &[], &["alpha", "bravo", "xray1", "yankee"], None),
        ];
        assert!(GreedyStrategy.build(&docs, &EngineConfig::default()).is_empty());
    }

    #[test]
    fn test_force_clusters_everything() {
        let docs = vec![
            doc("a.md", &[], &["alpha"], None),
            doc("b.md", &[], &["bravo"], None),
            doc("c.md", &[], &[], None),
        ];
        let config = EngineConfig {
            force: true,
            ..EngineConfig::default()
        };
        let clusters = GreedyStrategy.build(&docs, &config);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn test_no_document_in_two_clusters() {
        let docs = vec![
            doc("a.md", &["#api"], &[], None),
            doc("b.md", &["#api", "#ml"], &[], None),
            doc("c.md", &["#ml"], &[], None),
            doc("d.md", &["#ml"], &[], None),
        ];
        let clusters = GreedyStrategy.build(&docs, &EngineConfig::default());
        let mut seen: Vec<String> = clusters.iter().flat_map(names).collect();
        let total = seen.len();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), total);
        assert_eq!(names(&clusters[0]), vec!["a.md", "b.md"]);
        assert_eq!(names(&clusters[1]), vec!["c.md", "d.md"]);
    }

    #[test]
    fn test_greedy_is_deterministic() {
        let docs = chain();
        let config = EngineConfig::default();
        let first: Vec<Vec<String>> = GreedyStrategy.build(&docs, &config).iter().map(names).collect();
        let second: Vec<Vec<String>> = GreedyStrategy.build(&docs, &config).iter().map(names).collect();
        assert_eq!(first, second);
    }
}
