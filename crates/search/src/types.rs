// crates/search/src/types.rs
use serde::Serialize;

/// Response from a full-text search query across all conversations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub total_conversations: usize,
    pub elapsed_ms: f64,
    pub results: Vec<SearchHit>,
}

/// A single conversation matching a search, carrying its best-scoring message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub conversation_id: i64,
    pub session_id: String,
    pub project_path: String,
    pub project_name: String,
    pub updated_at: i64,
    /// BM25 score. More negative is a stronger match (SQLite FTS5 convention);
    /// callers sort ascending.
    pub score: f64,
    pub snippet: String,
}

/// Header fields returned alongside a conversation's paginated messages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationHeader {
    pub conversation_id: i64,
    pub session_id: String,
    pub project_path: String,
    pub project_name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub message_count: i64,
    pub total_tokens: i64,
    pub file_references: Vec<String>,
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedMessage {
    pub message_index: i64,
    pub role: String,
    pub timestamp: Option<String>,
    pub content: String,
    pub tokens: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub total_pages: usize,
    pub total_messages: usize,
    pub total_tokens: i64,
    pub has_next: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub header: ConversationHeader,
    pub messages: Vec<FormattedMessage>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarSolution {
    pub hit: SearchHit,
    pub overlap: f64,
}
