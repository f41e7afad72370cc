// crates/search/src/query.rs
//! FTS5 query construction: mode/logic selection, fuzzy-via-prefix approximation,
//! bm25 ranking, snippet windows, pagination and timeframe parsing.

use chrono::{NaiveDate, TimeZone, Utc};

use crate::types::{
    ConversationContext, ConversationHeader, FormattedMessage, Pagination, SearchHit,
    SearchResponse, SimilarSolution,
};
use crate::SearchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Fuzzy,
    Exact,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    Or,
    And,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    Full,
    Condensed,
    KeyPointsOnly,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub search_mode: SearchMode,
    pub fuzzy_threshold: f64,
    pub logic: Logic,
    pub project_filter: Option<String>,
    pub timeframe: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            search_mode: SearchMode::Fuzzy,
            fuzzy_threshold: 0.6,
            logic: Logic::Or,
            project_filter: None,
            timeframe: None,
            limit: 20,
            offset: 0,
        }
    }
}

/// Escape a term for embedding inside an FTS5 double-quoted string.
fn escape_fts5_literal(term: &str) -> String {
    term.replace('"', "\"\"")
}

/// Build the FTS5 `MATCH` argument for a raw query string and search options.
///
/// - `exact`: the whole query, double-quoted (phrase match).
/// - `fuzzy`/`mixed`: per-term, joined by `logic`. Terms longer than 4 chars get
///   a trailing `*` when `fuzzy_threshold < 0.8`, approximating fuzzy recall via
///   FTS5 prefix matching (no edit-distance index is available over FTS5).
/// - `mixed` additionally prepends the quoted whole-query phrase so phrase hits
///   outrank bag-of-words hits under `bm25`.
pub fn build_match_query(query: &str, opts: &SearchOptions) -> Option<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return None;
    }

    let op = match opts.logic {
        Logic::Or => "OR",
        Logic::And => "AND",
    };

    let terms: Vec<String> = trimmed
        .split_whitespace()
        .map(|t| {
            let escaped = escape_fts5_literal(t);
            if t.chars().count() > 4 && opts.fuzzy_threshold < 0.8 {
                format!("{escaped}*")
            } else {
                escaped
            }
        })
        .collect();

    let disjunction = terms.join(&format!(" {op} "));
    let phrase = format!("\"{}\"", escape_fts5_literal(trimmed));

    Some(match opts.search_mode {
        SearchMode::Exact => phrase,
        SearchMode::Fuzzy => disjunction,
        SearchMode::Mixed => format!("{phrase} OR ({disjunction})"),
    })
}

/// Parse a lowercase English timeframe expression into a lower bound on
/// `created_at` (unix seconds). Unrecognized input returns `None` (no filter).
pub fn parse_timeframe(input: &str) -> Option<i64> {
    let now = Utc::now();
    let lowered = input.trim().to_lowercase();

    if let Ok(date) = NaiveDate::parse_from_str(&lowered, "%Y-%m-%d") {
        return Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?).timestamp().into();
    }

    match lowered.as_str() {
        "today" => {
            let start = now.date_naive().and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&start).timestamp());
        }
        "yesterday" => {
            let start = (now.date_naive() - chrono::Duration::days(1)).and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&start).timestamp());
        }
        "last week" => {
            return Some((now - chrono::Duration::weeks(1)).timestamp());
        }
        _ => {}
    }

    let mut parts = lowered.splitn(2, ' ');
    let n: i64 = parts.next()?.parse().ok()?;
    let unit = parts.next()?;

    let duration = if unit.starts_with("hour") {
        chrono::Duration::hours(n)
    } else if unit.starts_with("day") {
        chrono::Duration::days(n)
    } else if unit.starts_with("week") {
        chrono::Duration::weeks(n)
    } else if unit.starts_with("month") {
        chrono::Duration::days(n * 30)
    } else {
        return None;
    };

    Some((now - duration).timestamp())
}

/// Build a `<mark>`-highlighted snippet around the first matched term, capped
/// at a 32-token window, with leading/trailing ellipsis when truncated.
pub fn build_snippet(content: &str, query_terms: &[String]) -> String {
    const WINDOW: usize = 32;

    let tokens: Vec<&str> = content.split_whitespace().collect();
    if tokens.is_empty() {
        return String::new();
    }

    let lowered_terms: Vec<String> = query_terms
        .iter()
        .map(|t| t.trim_end_matches('*').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let match_idx = tokens.iter().position(|tok| {
        let lowered = tok.to_lowercase();
        lowered_terms.iter().any(|term| lowered.contains(term.as_str()))
    });

    let center = match_idx.unwrap_or(0);
    let half = WINDOW / 2;
    let start = center.saturating_sub(half);
    let end = (start + WINDOW).min(tokens.len());

    let mut out = String::new();
    if start > 0 {
        out.push_str("... ");
    }
    for (i, tok) in tokens[start..end].iter().enumerate() {
        let lowered = tok.to_lowercase();
        let is_match = lowered_terms.iter().any(|term| lowered.contains(term.as_str()));
        if i > 0 {
            out.push(' ');
        }
        if is_match {
            out.push_str(&format!("<mark>{tok}</mark>"));
        } else {
            out.push_str(tok);
        }
    }
    if end < tokens.len() {
        out.push_str(" ...");
    }
    out
}

pub(crate) fn extract_query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.trim_matches('"').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

pub(crate) struct RawHit {
    pub conversation_id: i64,
    pub session_id: String,
    pub project_path: String,
    pub project_name: String,
    pub updated_at: i64,
    pub score: f64,
    pub content: String,
}

pub(crate) fn build_response(
    query: &str,
    elapsed_ms: f64,
    rows: Vec<RawHit>,
    query_terms: &[String],
) -> SearchResponse {
    let mut seen = std::collections::HashSet::new();
    let mut results = Vec::new();

    for row in rows {
        if !seen.insert(row.conversation_id) {
            continue;
        }
        results.push(SearchHit {
            conversation_id: row.conversation_id,
            session_id: row.session_id,
            project_path: row.project_path,
            project_name: row.project_name,
            updated_at: row.updated_at,
            score: row.score,
            snippet: build_snippet(&row.content, query_terms),
        });
    }

    SearchResponse {
        query: query.to_string(),
        total_conversations: results.len(),
        elapsed_ms,
        results,
    }
}

pub(crate) fn apply_summary_mode(mode: SummaryMode, content: &str, content_summary: Option<&str>) -> String {
    const CONDENSED_LEN: usize = 200;
    const KEY_POINTS_LEN: usize = 100;

    match mode {
        SummaryMode::Full => content.to_string(),
        SummaryMode::Condensed => truncate_with_ellipsis(content, CONDENSED_LEN),
        SummaryMode::KeyPointsOnly => match content_summary {
            Some(summary) if !summary.is_empty() => summary.to_string(),
            _ => truncate_with_ellipsis(content, KEY_POINTS_LEN),
        },
    }
}

fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{truncated}...")
}

pub(crate) fn build_context(
    header: ConversationHeader,
    messages: Vec<FormattedMessage>,
    page: usize,
    page_size: usize,
    total_messages: usize,
    total_tokens: i64,
) -> ConversationContext {
    let total_pages = total_messages.div_ceil(page_size).max(1);
    ConversationContext {
        header,
        pagination: Pagination {
            page,
            total_pages,
            total_messages,
            total_tokens,
            has_next: page < total_pages,
        },
        messages,
    }
}

/// Overlap score between tokenized problem description and a search hit's
/// snippet, per §4.5.3: `|problem ∩ preview| / |problem|`, matching either
/// substring direction.
pub(crate) fn overlap_score(problem_tokens: &[String], preview_tokens: &[String]) -> f64 {
    if problem_tokens.is_empty() {
        return 0.0;
    }
    let matched = problem_tokens
        .iter()
        .filter(|p| {
            preview_tokens
                .iter()
                .any(|t| t.contains(p.as_str()) || p.contains(t.as_str()))
        })
        .count();
    matched as f64 / problem_tokens.len() as f64
}

pub(crate) fn tokenize_plain(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 3)
        .collect()
}

pub(crate) fn to_similar_solutions(
    hits: Vec<SearchHit>,
    problem_tokens: &[String],
    confidence_threshold: f64,
) -> Vec<SimilarSolution> {
    let mut scored: Vec<SimilarSolution> = hits
        .into_iter()
        .filter_map(|hit| {
            let preview_tokens = tokenize_plain(&hit.snippet);
            let overlap = overlap_score(problem_tokens, &preview_tokens);
            if overlap >= confidence_threshold {
                Some(SimilarSolution { hit, overlap })
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|a, b| b.overlap.partial_cmp(&a.overlap).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(5);
    scored
}

pub(crate) fn map_err(e: sqlx::Error) -> SearchError {
    SearchError::Store(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_mode_quotes_whole_query() {
        let opts = SearchOptions {
            search_mode: SearchMode::Exact,
            ..Default::default()
        };
        assert_eq!(build_match_query("fix auth bug", &opts).unwrap(), "\"fix auth bug\"");
    }

    #[test]
    fn fuzzy_mode_applies_prefix_wildcard_to_long_terms() {
        let opts = SearchOptions {
            search_mode: SearchMode::Fuzzy,
            fuzzy_threshold: 0.6,
            logic: Logic::Or,
            ..Default::default()
        };
        assert_eq!(build_match_query("auth fix", &opts).unwrap(), "auth* OR fix");
    }

    #[test]
    fn fuzzy_mode_skips_wildcard_above_threshold() {
        let opts = SearchOptions {
            fuzzy_threshold: 0.9,
            ..Default::default()
        };
        assert_eq!(build_match_query("authentication", &opts).unwrap(), "authentication");
    }

    #[test]
    fn mixed_mode_prepends_phrase() {
        let opts = SearchOptions {
            search_mode: SearchMode::Mixed,
            logic: Logic::And,
            fuzzy_threshold: 0.6,
            ..Default::default()
        };
        assert_eq!(
            build_match_query("auth bug", &opts).unwrap(),
            "\"auth bug\" OR (auth* AND bug)"
        );
    }

    #[test]
    fn empty_query_returns_none() {
        let opts = SearchOptions::default();
        assert!(build_match_query("   ", &opts).is_none());
    }

    #[test]
    fn timeframe_relative_days() {
        let bound = parse_timeframe("3 days").unwrap();
        assert!(bound < Utc::now().timestamp());
    }

    #[test]
    fn timeframe_today() {
        assert!(parse_timeframe("today").is_some());
    }

    #[test]
    fn timeframe_iso_date() {
        assert!(parse_timeframe("2026-01-15").is_some());
    }

    #[test]
    fn timeframe_unrecognized_is_none() {
        assert!(parse_timeframe("banana").is_none());
    }

    #[test]
    fn snippet_highlights_matched_term_within_window() {
        let content = "we need to fix the authentication bug in the login flow today";
        let snippet = build_snippet(content, &["authentication".to_string()]);
        assert!(snippet.contains("<mark>authentication</mark>"));
    }

    #[test]
    fn overlap_score_counts_substring_matches_either_direction() {
        let problem = vec!["auth".to_string(), "token".to_string(), "refresh".to_string()];
        let preview = vec!["authentication".to_string(), "tokens".to_string()];
        let score = overlap_score(&problem, &preview);
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn summary_mode_condensed_truncates() {
        let long = "a".repeat(250);
        let out = apply_summary_mode(SummaryMode::Condensed, &long, None);
        assert_eq!(out.chars().count(), 203);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn summary_mode_key_points_prefers_summary() {
        let out = apply_summary_mode(SummaryMode::KeyPointsOnly, "full content here", Some("short summary"));
        assert_eq!(out, "short summary");
    }
}
