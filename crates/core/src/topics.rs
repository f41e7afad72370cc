// crates/core/src/topics.rs
//! Deterministic topic/keyword extraction over conversation text.
//!
//! No ML, no external vocabulary file: tokenize, drop stop-words and short
//! tokens, rank by frequency (ties by first-seen order), keep the top 8 as
//! `keywords`. `topics` is the same ranking restricted to a small
//! software-domain vocabulary, falling back to `keywords` when nothing in
//! the text matches it.

const MAX_KEYWORDS: usize = 8;

const DOMAIN_VOCABULARY: &[&str] = &[
    "auth", "api", "test", "bug", "schema", "migration", "index", "search", "parser", "config",
];

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "her", "was", "one", "our",
    "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see", "two",
    "way", "who", "boy", "did", "its", "let", "put", "say", "she", "too", "use", "with", "this",
    "that", "from", "have", "will", "your", "what", "when", "make", "like", "time", "just",
    "know", "take", "into", "year", "good", "some", "could", "them", "than", "then", "look",
    "only", "come", "over", "think", "also", "back", "after", "work", "first", "well", "even",
    "want", "because", "these", "give", "most", "file", "files", "does", "doesn", "didn", "don",
    "should", "would", "there", "here", "about", "again", "where", "which", "while", "being",
    "been", "were", "each", "same", "such", "both", "more", "much", "need", "still", "going",
    "yes", "okay", "sure", "thanks", "please", "right", "sorry", "actually", "basically",
];

/// Tokenize into lowercase alphanumeric runs, dropping short and stop-word tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|tok| tok.to_lowercase())
        .filter(|tok| tok.len() >= 3)
        .filter(|tok| !STOP_WORDS.contains(&tok.as_str()))
        .collect()
}

/// Rank tokens by frequency, ties broken by order of first appearance.
fn rank_by_frequency(tokens: &[String]) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for tok in tokens {
        match counts.iter_mut().find(|(t, _)| t == tok) {
            Some((_, c)) => *c += 1,
            None => counts.push((tok.clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(t, _)| t).collect()
}

/// Extract `(topics, keywords)` from the full text of a conversation.
pub fn extract_topics_and_keywords(text: &str) -> (Vec<String>, Vec<String>) {
    let tokens = tokenize(text);
    let ranked = rank_by_frequency(&tokens);
    let keywords: Vec<String> = ranked.iter().take(MAX_KEYWORDS).cloned().collect();

    let domain_ranked: Vec<String> = ranked
        .into_iter()
        .filter(|t| DOMAIN_VOCABULARY.contains(&t.as_str()))
        .take(MAX_KEYWORDS)
        .collect();

    let topics = if domain_ranked.is_empty() {
        keywords.clone()
    } else {
        domain_ranked
    };

    (topics, keywords)
}
