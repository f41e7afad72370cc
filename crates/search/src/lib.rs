// crates/search/src/lib.rs
//! Query engine over the FTS5-backed conversation store.
//!
//! Search indexing itself lives in `conversant_store` — triggers keep
//! `messages_fts` in sync with `messages` on every write, so this crate never
//! writes to the index. It only builds `MATCH` expressions, runs `bm25`
//! ranked reads, and shapes results (snippets, pagination, similarity scoring).

pub mod query;
pub mod types;

use conversant_store::Store;
use sqlx::Row;
use std::time::Instant;
use thiserror::Error;

pub use query::{Logic, SearchMode, SearchOptions, SummaryMode};
pub use types::{ConversationContext, ConversationHeader, FormattedMessage, Pagination, SearchHit, SearchResponse, SimilarSolution};

use query::{apply_summary_mode, build_context, build_match_query, build_response, extract_query_terms, map_err, to_similar_solutions, tokenize_plain, RawHit};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("unknown session_id: {0}")]
    UnknownSession(String),
}

pub type SearchResult<T> = Result<T, SearchError>;

pub struct SearchEngine<'a> {
    store: &'a Store,
}

impl<'a> SearchEngine<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Full-text search over all conversations. §4.5.1.
    pub async fn search(&self, raw_query: &str, opts: &SearchOptions) -> SearchResult<SearchResponse> {
        let start = Instant::now();

        let Some(match_expr) = build_match_query(raw_query, opts) else {
            return Ok(SearchResponse {
                query: raw_query.to_string(),
                total_conversations: 0,
                elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                results: vec![],
            });
        };

        let lower_bound = opts.timeframe.as_deref().and_then(query::parse_timeframe);
        let project_pattern = opts.project_filter.as_ref().map(|p| format!("%{p}%"));

        let sql = "
            SELECT
                c.id AS conversation_id,
                c.session_id,
                c.project_path,
                c.project_name,
                c.updated_at,
                bm25(messages_fts) AS score,
                m.content
            FROM messages_fts
            JOIN messages m ON m.id = messages_fts.rowid
            JOIN conversations c ON c.id = m.conversation_id
            WHERE messages_fts MATCH ?
              AND (? IS NULL OR c.project_path LIKE ?)
              AND (? IS NULL OR c.created_at >= ?)
            ORDER BY score ASC, c.updated_at DESC, c.id DESC
            LIMIT ?
        ";

        // Fetch extra rows before per-conversation de-duplication so that
        // `limit` distinct conversations still surface after collapsing.
        let fetch_cap = ((opts.limit + opts.offset) * 4).max(50) as i64;

        let rows = sqlx::query(sql)
            .bind(&match_expr)
            .bind(&project_pattern)
            .bind(&project_pattern)
            .bind(lower_bound)
            .bind(lower_bound)
            .bind(fetch_cap)
            .fetch_all(self.store.pool())
            .await
            .map_err(map_err)?;

        let raw_hits: Vec<RawHit> = rows
            .into_iter()
            .map(|row| RawHit {
                conversation_id: row.get("conversation_id"),
                session_id: row.get("session_id"),
                project_path: row.get("project_path"),
                project_name: row.get("project_name"),
                updated_at: row.get("updated_at"),
                score: row.get("score"),
                content: row.get("content"),
            })
            .collect();

        let terms = extract_query_terms(raw_query);
        let mut response = build_response(raw_query, start.elapsed().as_secs_f64() * 1000.0, raw_hits, &terms);

        response.results = response
            .results
            .into_iter()
            .skip(opts.offset)
            .take(opts.limit)
            .collect();
        response.total_conversations = response.results.len();

        Ok(response)
    }

    /// Paginated conversation context with token budgeting. §4.5.2.
    #[allow(clippy::too_many_arguments)]
    pub async fn conversation_context(
        &self,
        session_id: &str,
        page: usize,
        page_size: usize,
        max_tokens: i64,
        content_types: Option<&[&str]>,
        summary_mode: SummaryMode,
    ) -> SearchResult<Option<ConversationContext>> {
        let page = page.max(1);
        let page_size = page_size.max(1);

        let conv_row = sqlx::query(
            "SELECT id, session_id, project_path, project_name, created_at, updated_at,
                    message_count, total_tokens, file_references, topics, keywords
             FROM conversations WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(self.store.pool())
        .await
        .map_err(map_err)?;

        let Some(conv_row) = conv_row else {
            return Ok(None);
        };

        let conversation_id: i64 = conv_row.get("id");
        let header = ConversationHeader {
            conversation_id,
            session_id: conv_row.get("session_id"),
            project_path: conv_row.get("project_path"),
            project_name: conv_row.get("project_name"),
            created_at: conv_row.get("created_at"),
            updated_at: conv_row.get("updated_at"),
            message_count: conv_row.get("message_count"),
            total_tokens: conv_row.get("total_tokens"),
            file_references: parse_json_strings(conv_row.get("file_references")),
            topics: parse_json_strings(conv_row.get("topics")),
            keywords: parse_json_strings(conv_row.get("keywords")),
        };

        let role_filter_sql = match content_types {
            Some(roles) if !roles.is_empty() => {
                let placeholders = roles.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                format!("AND role IN ({placeholders})")
            }
            _ => String::new(),
        };

        let query_sql = format!(
            "SELECT message_index, role, timestamp, content, content_summary, tokens
             FROM messages WHERE conversation_id = ? {role_filter_sql}
             ORDER BY message_index ASC"
        );
        let mut query = sqlx::query(&query_sql).bind(conversation_id);
        if let Some(roles) = content_types {
            for role in roles {
                query = query.bind(*role);
            }
        }
        let all_rows = query.fetch_all(self.store.pool()).await.map_err(map_err)?;

        let total_messages = all_rows.len();
        let start_idx = (page - 1) * page_size;

        let mut messages = Vec::new();
        let mut used_tokens: i64 = 0;

        for row in all_rows.iter().skip(start_idx) {
            if messages.len() >= page_size {
                break;
            }
            let tokens: i64 = row.get("tokens");
            // Never truncate the first message of a page — guarantees forward progress.
            if !messages.is_empty() && used_tokens + tokens > max_tokens {
                break;
            }
            used_tokens += tokens;

            let content: String = row.get("content");
            let content_summary: Option<String> = row.get("content_summary");
            let formatted = apply_summary_mode(summary_mode, &content, content_summary.as_deref());

            messages.push(FormattedMessage {
                message_index: row.get("message_index"),
                role: row.get("role"),
                timestamp: row.get("timestamp"),
                content: formatted,
                tokens,
            });
        }

        let total_tokens: i64 = all_rows.iter().map(|r| r.get::<i64, _>("tokens")).sum();

        Ok(Some(build_context(header, messages, page, page_size, total_messages, total_tokens)))
    }

    /// Find conversations whose content overlaps a problem description. §4.5.3.
    pub async fn similar_solutions(&self, problem_description: &str, confidence_threshold: f64) -> SearchResult<Vec<SimilarSolution>> {
        let problem_tokens = tokenize_plain(problem_description);
        let response = self.search(problem_description, &SearchOptions::default()).await?;
        Ok(to_similar_solutions(response.results, &problem_tokens, confidence_threshold))
    }
}

fn parse_json_strings(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}
