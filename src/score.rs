use std::collections::HashSet;

use crate::document::{Document, PairScore};

/// Pairwise overlap between two documents.
///
/// Shared system tags win outright. Oversized documents only pair on an
/// identical file name, since their keywords come from the name alone.
/// Otherwise overlap is shared keywords over the smaller keyword set.
pub fn score(a: &Document, b: &Document) -> PairScore {
    let shared_tags: Vec<&str> = a.tags.intersection(&b.tags).map(String::as_str).collect();
    if !shared_tags.is_empty() {
        return PairScore {
            overlap: 1.0,
            reason: format!("shared tags: {}", shared_tags.join(", ")),
        };
    }

    if a.is_oversized() || b.is_oversized() {
        return if a.name == b.name {
            PairScore {
                overlap: 1.0,
                reason: format!("oversized pairing on identical name '{}'", a.name),
            }
        } else {
            PairScore {
                overlap: 0.0,
                reason: "oversized document, names differ".to_string(),
            }
        };
    }

    let smaller = a.keywords.len().min(b.keywords.len());
    if smaller == 0 {
        return PairScore {
            overlap: 0.0,
            reason: "no keywords to compare".to_string(),
        };
    }

    let other: HashSet<&str> = b.keywords.iter().map(String::as_str).collect();
    let shared: Vec<&str> = a
        .keywords
        .iter()
        .map(String::as_str)
        .filter(|k| other.contains(k))
        .collect();

    let overlap = shared.len() as f64 / smaller as f64;
    let reason = if shared.is_empty() {
        format!("no shared keywords (0/{} = 0.00)", smaller)
    } else {
        format!(
            "shared keywords ({}/{} = {:.2}): {}",
            shared.len(),
            smaller,
            overlap,
            shared.join(", ")
        )
    };

    PairScore { overlap, reason }
}
