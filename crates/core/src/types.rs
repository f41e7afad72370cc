// crates/core/src/types.rs
//! Shared value types for a normalized conversation: roles, messages,
//! tool-call references and the parsed-session envelope the indexer stores.

use serde::{Deserialize, Serialize};

/// Role of a single parsed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolUse,
    ToolResult,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::ToolUse => "tool_use",
            Role::ToolResult => "tool_result",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "tool_use" => Some(Role::ToolUse),
            "tool_result" => Some(Role::ToolResult),
            _ => None,
        }
    }
}

/// A single tool invocation referenced by an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

/// A normalized message within a parsed conversation.
///
/// `message_index` is assigned by the parser in file order and is the
/// stable ordering key the store persists (§3 `(conversation_id, message_index)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_index: usize,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub content_type: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_references: Vec<String>,
    pub tokens: i64,
}

impl Message {
    pub fn new(message_index: usize, role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        Self {
            message_index,
            role,
            uuid: None,
            timestamp: None,
            content_type: "text".to_string(),
            content,
            content_summary: None,
            tool_calls: Vec::new(),
            file_references: Vec::new(),
            tokens,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn with_file_references(mut self, refs: Vec<String>) -> Self {
        self.file_references = refs;
        self
    }
}

/// Estimate tokens as `ceil(len(content) / 4)`, the caller-supplied-or-estimated
/// rule from §3's Message invariants.
pub fn estimate_tokens(content: &str) -> i64 {
    let len = content.chars().count();
    ((len + 3) / 4) as i64
}

/// A fully parsed conversation, ready for upsert into the Store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedConversation {
    pub session_id: String,
    pub project_path: String,
    pub project_name: String,
    pub messages: Vec<Message>,
    pub created_at: i64,
    pub updated_at: i64,
    pub file_references: Vec<String>,
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    /// Lines that failed to parse as JSON or had an unrecognized shape.
    pub skipped_lines: usize,
}

impl ParsedConversation {
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn total_tokens(&self) -> i64 {
        self.messages.iter().map(|m| m.tokens).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
