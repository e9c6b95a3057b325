use std::collections::BTreeMap;

use crate::cluster::Cluster;

/// Document types in match priority order, with the words that select them.
const DOC_TYPES: &[(&str, &[&str])] = &[
    ("guide", &["guide", "tutorial", "howto"]),
    ("implementation", &["implementation"]),
    ("summary", &["summary"]),
    ("overview", &["overview"]),
];

const DEFAULT_DOC_TYPE: &str = "overview";
const LARGE_FILE_DOC_TYPE: &str = "large-file";

/// Lowercase, `[a-z0-9-]` only, hyphens collapsed and trimmed.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_hyphen = false;
    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    out
}

/// Tag text without its marker, e.g. `#firebase` -> `firebase`.
fn strip_tag(tag: &str) -> String {
    sanitize(tag)
}

/// Keywords across the cluster by frequency; ties keep first-seen order.
fn ranked_keywords(cluster: &Cluster) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for doc in cluster.members() {
        for kw in &doc.keywords {
            match counts.iter_mut().find(|(k, _)| k == kw) {
                Some((_, n)) => *n += 1,
                None => counts.push((kw.clone(), 1)),
            }
        }
    }
    // stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(k, _)| k).collect()
}

fn tag_counts<'a>(cluster: &Cluster<'a>) -> BTreeMap<&'a str, usize> {
    let mut counts = BTreeMap::new();
    for doc in cluster.members() {
        for tag in &doc.tags {
            *counts.entry(tag.as_str()).or_insert(0) += 1;
        }
    }
    counts
}

fn doc_type(cluster: &Cluster, degraded: bool, keywords: &[String]) -> &'static str {
    if degraded {
        return LARGE_FILE_DOC_TYPE;
    }

    let names: Vec<String> = cluster.members().map(|d| d.name.to_lowercase()).collect();
    for (doc_type, words) in DOC_TYPES {
        if names.iter().any(|n| words.iter().any(|w| n.contains(w))) {
            return doc_type;
        }
    }
    for (doc_type, words) in DOC_TYPES {
        if keywords.iter().any(|k| words.iter().any(|w| k == w)) {
            return doc_type;
        }
    }
    DEFAULT_DOC_TYPE
}

/// `{primary}[-{secondary}]-{docType}.md`.
///
/// Primary topic is the first tag shared by two or more members, else the most
/// frequent keyword, else the base file name prefix. Secondary topic is the
/// next distinct tag or keyword, if any.
pub fn canonical_name(cluster: &Cluster, degraded: bool) -> String {
    let tags = tag_counts(cluster);
    let shared: Vec<String> = tags
        .iter()
        .filter(|(_, n)| **n >= 2)
        .map(|(t, _)| strip_tag(t))
        .filter(|t| !t.is_empty())
        .collect();
    let all_tags: Vec<String> = tags
        .keys()
        .map(|t| strip_tag(t))
        .filter(|t| !t.is_empty())
        .collect();
    let keywords = ranked_keywords(cluster);
    let keyword_topics: Vec<String> = keywords
        .iter()
        .map(|k| sanitize(k))
        .filter(|k| !k.is_empty())
        .collect();

    let base_prefix = cluster
        .base
        .stem()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .map(sanitize)
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| "document".to_string());

    let primary = shared
        .first()
        .or_else(|| keyword_topics.first())
        .cloned()
        .unwrap_or(base_prefix);

    let secondary = shared
        .iter()
        .chain(all_tags.iter())
        .chain(keyword_topics.iter())
        .find(|t| **t != primary)
        .cloned();

    let doc_type = doc_type(cluster, degraded, &keywords);

    let raw = match secondary {
        Some(secondary) if secondary != doc_type => format!("{primary}-{secondary}-{doc_type}"),
        _ => format!("{primary}-{doc_type}"),
    };

    format!("{}.md", sanitize(&raw))
}

/// `name.md` -> `name-2.md` for collision avoidance.
pub fn with_counter(file_name: &str, counter: usize) -> String {
    let stem = file_name.strip_suffix(".md").unwrap_or(file_name);
    format!("{stem}-{counter}.md")
}

/// `firebase-security-overview.md` -> `Firebase Security Overview`.
pub fn title_from(file_name: &str) -> String {
    file_name
        .strip_suffix(".md")
        .unwrap_or(file_name)
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
