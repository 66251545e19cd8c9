//! Keyword extraction for search queries.

const MAX_KEYWORDS: usize = 5;

const QUESTION_WORDS: &[&str] = &[
    "что", "как", "почему", "зачем", "где", "когда", "кто", "какой", "какая", "какие", "каким",
    "сколько", "чем", "можно", "ли", "what", "how", "why", "where", "when", "who", "which",
    "can", "does", "is", "are",
];

const STOP_WORDS: &[&str] = &[
    "это", "то", "такое", "такой", "такая", "такие", "же", "бы", "не", "ни", "да", "нет", "мне",
    "вам", "нам", "им", "ему", "ей", "и", "а", "но", "или", "если", "так", "для", "от", "по",
    "на", "из", "за", "про", "the", "and", "for", "with", "about", "this", "that", "you", "your",
    "from", "into", "there", "their", "have", "has", "was", "were",
];

fn is_stop_word(word: &str) -> bool {
    QUESTION_WORDS.contains(&word) || STOP_WORDS.contains(&word)
}

/// Extracts up to five search keywords from a free-text question.
///
/// Punctuation is treated as whitespace, question and stop words are dropped
/// and only words longer than two characters are kept, in order of appearance.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !is_stop_word(w))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}
