//! Near-duplicate removal.

use super::{ScoredSnippet, rank_order};
use std::collections::HashSet;
use tracing::{debug, info};

const PREFIX_CHARS: usize = 100;
const MIN_KEY_WORD_CHARS: usize = 4;

#[derive(Debug, Clone)]
pub struct Deduplicator {
    similarity_threshold: f64,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(0.6)
    }
}

impl Deduplicator {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Two snippets are duplicates when their normalized leading text is equal
    /// or their key-word sets overlap at or above the threshold.
    pub fn are_similar(&self, a: &str, b: &str) -> bool {
        if normalized_prefix(a) == normalized_prefix(b) {
            return true;
        }
        jaccard(&key_words(a), &key_words(b)) >= self.similarity_threshold
    }

    /// Keeps the best-ranked snippet of every cluster of near-duplicates.
    pub fn deduplicate(&self, mut snippets: Vec<ScoredSnippet>) -> Vec<ScoredSnippet> {
        let before = snippets.len();
        snippets.sort_by(rank_order);

        let mut unique: Vec<ScoredSnippet> = Vec::with_capacity(snippets.len());
        for snippet in snippets {
            if unique.iter().any(|kept| self.are_similar(&kept.text, &snippet.text)) {
                debug!(source = %snippet.source, score = snippet.score, "Dropped duplicate snippet");
                continue;
            }
            unique.push(snippet);
        }

        let removed = before - unique.len();
        if removed > 0 {
            info!(removed, "Duplicates removed");
        }
        unique
    }
}

/// Lowercased text with collapsed whitespace, cut to the first 100 characters.
pub fn normalized_prefix(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(PREFIX_CHARS)
        .collect()
}

/// Purely alphabetic words of four or more letters.
fn key_words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_KEY_WORD_CHARS && w.chars().all(char::is_alphabetic))
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::SourceKind;

    fn snippet(text: &str, score: f64, kind: SourceKind) -> ScoredSnippet {
        ScoredSnippet {
            text: text.to_string(),
            source: "test".to_string(),
            kind,
            score,
            created_at: None,
        }
    }

    #[test]
    fn test_same_prefix_keeps_higher_score() {
        let prefix = "Systems thinking means looking at the whole rather than the parts, and at the relations between them. ";
        let low = snippet(&format!("{prefix}First tail."), 0.2, SourceKind::Guides);
        let high = snippet(&format!("{prefix}Second, different tail."), 0.7, SourceKind::Guides);

        let result = Deduplicator::default().deduplicate(vec![low, high]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].score, 0.7);
    }

    #[test]
    fn test_whitespace_and_case_are_normalized() {
        let dedup = Deduplicator::default();
        assert!(dedup.are_similar("Hello   World\nagain", "hello world again"));
    }

    #[test]
    fn test_word_overlap_counts_as_duplicate() {
        let dedup = Deduplicator::default();
        let a = "Attention management requires deliberate practice every single morning";
        let b = "Every single morning, attention management requires deliberate practice";
        assert!(dedup.are_similar(a, b));
        assert!(!dedup.are_similar(a, "Completely unrelated sentence about cooking pasta"));
    }

    #[test]
    fn test_tie_prefers_knowledge() {
        let text = "Identical content that appears in both backends with the same leading words";
        let guides = snippet(text, 0.5, SourceKind::Guides);
        let knowledge = snippet(text, 0.5, SourceKind::Knowledge);

        let result = Deduplicator::default().deduplicate(vec![guides, knowledge]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].kind, SourceKind::Knowledge);
    }

    #[test]
    fn test_distinct_snippets_survive() {
        let result = Deduplicator::default().deduplicate(vec![
            snippet("Notes on procrastination and how to notice it early", 0.3, SourceKind::Guides),
            snippet("A practical tracker for daily self-development slots", 0.4, SourceKind::Knowledge),
        ]);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].score, 0.4);
    }
}
