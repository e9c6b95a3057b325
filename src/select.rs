use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::cluster::Cluster;
use crate::document::Document;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^ {0,3}#{1,6}\s+\S").unwrap());
static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:[-*+]|\d+[.)])\s+\S").unwrap());

const W_RECENCY: f64 = 0.4;
const W_LENGTH: f64 = 0.3;
const W_STRUCTURE: f64 = 0.2;
const W_KEYWORDS: f64 = 0.1;

pub fn heading_count(content: &str) -> usize {
    HEADING_RE.find_iter(content).count()
}

pub fn list_item_count(content: &str) -> usize {
    LIST_ITEM_RE.find_iter(content).count()
}

/// Weighted anchor score: recency, length, structure and keyword density.
/// Length is deliberately uncapped.
pub fn base_score(doc: &Document, now: DateTime<Utc>) -> f64 {
    let now_ms = now.timestamp_millis() as f64;
    let recency = if now_ms > 0.0 {
        doc.last_modified.timestamp_millis() as f64 / now_ms
    } else {
        0.0
    };

    let content = doc.content.as_deref().unwrap_or("");
    let length = content.len() as f64;
    let normalized_length = length / 10_000.0;
    let structure = (heading_count(content) + list_item_count(content)) as f64 / 50.0;
    let keyword_density = if length > 0.0 {
        doc.keywords.len() as f64 / (length / 100.0)
    } else {
        0.0
    };

    W_RECENCY * recency
        + W_LENGTH * normalized_length
        + W_STRUCTURE * structure
        + W_KEYWORDS * keyword_density
}

/// Most recently modified; ties go to the earliest in order.
fn most_recent<'a>(docs: impl Iterator<Item = &'a Document>) -> Option<&'a Document> {
    docs.fold(None, |best: Option<&'a Document>, d| match best {
        Some(b) if b.last_modified >= d.last_modified => Some(b),
        _ => Some(d),
    })
}

/// Pick the member that anchors the merge and rebuild the cluster around it.
/// A displaced base moves into `related`; member order is otherwise kept.
pub fn select_base<'a>(cluster: Cluster<'a>, now: DateTime<Utc>) -> Cluster<'a> {
    let members: Vec<&'a Document> = cluster.members().collect();

    // Members whose text we could read are preferred whenever one exists.
    let pool: Vec<&'a Document> = if members.iter().any(|d| d.is_mergeable()) {
        members.iter().copied().filter(|d| d.is_mergeable()).collect()
    } else {
        members.clone()
    };

    let chosen = if members.iter().any(|d| d.is_oversized()) {
        most_recent(pool.iter().copied().filter(|d| !d.is_oversized()))
            .or_else(|| most_recent(members.iter().copied().filter(|d| d.is_oversized())))
    } else {
        let mut best: Option<(&'a Document, f64)> = None;
        for d in pool.iter().copied() {
            let s = base_score(d, now);
            debug!(doc = %d.name, score = s, "base candidate");
            if best.map_or(true, |(_, top)| s > top) {
                best = Some((d, s));
            }
        }
        best.map(|(d, _)| d)
    };

    let Some(chosen) = chosen else {
        return cluster;
    };

    if std::ptr::eq(chosen, cluster.base) {
        return cluster;
    }

    debug!(previous = %cluster.base.name, chosen = %chosen.name, "base reassigned");
    let related = members
        .into_iter()
        .filter(|d| !std::ptr::eq(*d, chosen))
        .collect();

    Cluster {
        base: chosen,
        related,
        reasons: cluster.reasons,
    }
}
