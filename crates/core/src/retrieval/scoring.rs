//! Relevance scoring of snippets against the original query.

use super::expander::QueryExpander;

const KEYWORD_WEIGHT: f64 = 0.4;
const CONCEPT_WEIGHT: f64 = 0.3;
const RELATED_WEIGHT: f64 = 0.2;
const BOOST_WEIGHT: f64 = 0.2;
const SHORT_TEXT_CHARS: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    expander: QueryExpander,
}

impl RelevanceScorer {
    pub fn new(expander: QueryExpander) -> Self {
        Self { expander }
    }

    /// Scores `text` in `[0.0, 1.0]`.
    ///
    /// Keyword coverage, concept coverage and related-term presence are
    /// weighted 0.4 / 0.3 / 0.2, longer texts earn up to 0.1, texts under 100
    /// characters are halved, and coverage of `boost_terms` adds up to 0.2.
    pub fn score(&self, text: &str, query: &str, keywords: &[String], boost_terms: &[String]) -> f64 {
        let text_lower = text.to_lowercase();
        let mut score = 0.0;

        if !keywords.is_empty() {
            score += coverage(&text_lower, keywords.iter().map(String::as_str)) * KEYWORD_WEIGHT;
        }

        let concepts = self.expander.key_concepts(query);
        if !concepts.is_empty() {
            score += coverage(&text_lower, concepts.iter().copied()) * CONCEPT_WEIGHT;

            let related_found = concepts
                .iter()
                .filter(|c| {
                    self.expander
                        .related(c)
                        .iter()
                        .any(|term| text_lower.contains(term.as_str()))
                })
                .count();
            score += (related_found as f64 / concepts.len() as f64).min(1.0) * RELATED_WEIGHT;
        }

        let len = text.chars().count();
        if len > 500 {
            score += 0.1;
        } else if len > 200 {
            score += 0.05;
        }
        if len < SHORT_TEXT_CHARS {
            score *= 0.5;
        }

        if !boost_terms.is_empty() {
            score += coverage(&text_lower, boost_terms.iter().map(String::as_str)) * BOOST_WEIGHT;
        }

        score.min(1.0)
    }
}

/// Fraction of `terms` that occur in `text_lower`.
fn coverage<'a>(text_lower: &str, terms: impl Iterator<Item = &'a str>) -> f64 {
    let (matched, total) = terms.fold((0usize, 0usize), |(m, t), term| {
        let hit = text_lower.contains(&term.to_lowercase());
        (m + usize::from(hit), t + 1)
    });
    if total == 0 {
        0.0
    } else {
        matched as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_keyword_coverage() {
        let scorer = RelevanceScorer::default();
        let text = "a".repeat(150) + " attention matters";
        let full = scorer.score(&text, "q", &words(&["attention", "matters"]), &[]);
        let half = scorer.score(&text, "q", &words(&["attention", "unrelated"]), &[]);
        assert!((full - 0.4).abs() < 1e-9);
        assert!((half - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_concepts_and_related_terms() {
        let scorer = RelevanceScorer::default();
        let text = format!("Выгорание и усталость {}", "x".repeat(200));
        let score = scorer.score(&text, "что такое выгорание", &[], &[]);
        // concept 0.3 + related 0.2 + length 0.05
        assert!((score - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_short_text_is_halved() {
        let scorer = RelevanceScorer::default();
        let score = scorer.score("attention", "q", &words(&["attention"]), &[]);
        assert!((score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_boost_terms_and_clamp() {
        let scorer = RelevanceScorer::default();
        let text = format!("выгорание усталость focus {}", "y".repeat(600));
        let score = scorer.score(
            &text,
            "выгорание",
            &words(&["выгорание"]),
            &words(&["focus"]),
        );
        assert_eq!(score, 1.0);

        let unboosted = scorer.score(&"z".repeat(300), "q", &[], &words(&["focus"]));
        assert!((unboosted - 0.05).abs() < 1e-9);
    }
}
