// crates/core/src/parser.rs
//! Async JSONL transcript parser.
//!
//! Decodes a single transcript file (one JSON event per line) into a
//! `ParsedConversation`: ordered messages, tool-call references, file-path
//! extractions, and a deterministic topic/keyword summary. A malformed line
//! never aborts the file — it is skipped and counted; only an unreadable or
//! entirely non-JSON file raises a `ParseError`.

use crate::error::ParseError;
use crate::topics::extract_topics_and_keywords;
use crate::types::{Message, ParsedConversation, Role, ToolCall};
use regex_lite::Regex;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Matches `/abs/path/to/file.ext` or `rel/path/to/file.ext` — at least one
/// path separator, ending in a common source/config extension.
const FILE_REFERENCE_PATTERN: &str = r"(?:[\w.\-]*/)+[\w.\-]+\.(?:rs|ts|tsx|js|jsx|py|go|java|rb|c|cc|cpp|h|hpp|toml|json|yaml|yml|md|sql|sh|proto)\b";

fn is_uuid_shaped(s: &str) -> bool {
    let s = s.as_bytes();
    if s.len() != 36 {
        return false;
    }
    for (i, &b) in s.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if b != b'-' {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}

/// Parse a transcript file into one normalized `ParsedConversation`.
///
/// # Errors
/// `ParseError::NotFound`/`PermissionDenied`/`Io` for filesystem failures;
/// `ParseError::EmptyFile` when the file has no content at all.
pub async fn parse_transcript(file_path: &Path) -> Result<ParsedConversation, ParseError> {
    let file = File::open(file_path)
        .await
        .map_err(|e| ParseError::io(file_path, e))?;

    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let file_reference_regex = Regex::new(FILE_REFERENCE_PATTERN).unwrap();
    let command_name_regex = Regex::new(r"(?s)<command-name>.*?</command-name>\s*").unwrap();
    let command_args_regex = Regex::new(r"(?s)<command-args>(.*?)</command-args>").unwrap();
    let command_message_regex = Regex::new(r"(?s)<command-message>.*?</command-message>\s*").unwrap();

    let mut messages: Vec<Message> = Vec::new();
    let mut file_references: Vec<String> = Vec::new();
    let mut session_id: Option<String> = None;
    let mut line_number: usize = 0;
    let mut non_empty_lines: usize = 0;
    let mut skipped_lines: usize = 0;
    let mut all_text = String::new();

    while let Some(raw_line) = lines.next_line().await.map_err(|e| ParseError::io(file_path, e))? {
        line_number += 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        non_empty_lines += 1;

        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!("skipping malformed JSON at line {} in {:?}: {}", line_number, file_path, e);
                skipped_lines += 1;
                continue;
            }
        };

        if session_id.is_none() {
            if let Some(sid) = value.get("sessionId").and_then(|v| v.as_str()) {
                session_id = Some(sid.to_string());
            }
        }

        let entry_type = match value.get("type").and_then(|t| t.as_str()) {
            Some(t) => t,
            None => {
                skipped_lines += 1;
                continue;
            }
        };

        let uuid = value.get("uuid").and_then(|v| v.as_str()).map(String::from);
        let timestamp = value.get("timestamp").and_then(|v| v.as_str()).map(String::from);

        let message = match entry_type {
            "user" => {
                if value.get("isMeta").and_then(|v| v.as_bool()) == Some(true) {
                    continue;
                }
                parse_user_event(&value, &command_name_regex, &command_args_regex, &command_message_regex)
            }
            "assistant" => parse_assistant_event(&value, &file_reference_regex, &mut file_references),
            "system" => parse_system_event(&value),
            _ => {
                debug!("ignoring entry type '{}' at line {}", entry_type, line_number);
                None
            }
        };

        if let Some(mut message) = message {
            message.message_index = messages.len();
            message.uuid = uuid;
            message.timestamp = timestamp;

            scan_file_references(&message.content, &file_reference_regex, &mut file_references);
            all_text.push_str(&message.content);
            all_text.push('\n');

            messages.push(message);
        }
    }

    if non_empty_lines == 0 {
        return Err(ParseError::EmptyFile { path: file_path.to_path_buf() });
    }

    let session_id = session_id.unwrap_or_else(|| derive_session_id_from_filename(file_path));

    let created_at = messages
        .iter()
        .filter_map(|m| m.timestamp.as_deref())
        .filter_map(parse_timestamp)
        .min()
        .unwrap_or(0);
    let updated_at = messages
        .iter()
        .filter_map(|m| m.timestamp.as_deref())
        .filter_map(parse_timestamp)
        .max()
        .unwrap_or(created_at);

    let (topics, keywords) = extract_topics_and_keywords(&all_text);

    file_references.sort();
    file_references.dedup();

    Ok(ParsedConversation {
        session_id,
        project_path: String::new(),
        project_name: String::new(),
        messages,
        created_at,
        updated_at,
        file_references,
        topics,
        keywords,
        skipped_lines,
    })
}

/// Attach the resolved project path/name (from the transcript file's parent
/// directory) to a parsed conversation. Kept as a separate step so the
/// parser itself has no dependency on the transcript root layout.
pub fn with_project(mut conversation: ParsedConversation, project_path: String, project_name: String) -> ParsedConversation {
    conversation.project_path = project_path;
    conversation.project_name = project_name;
    conversation
}

fn derive_session_id_from_filename(file_path: &Path) -> String {
    let stem = file_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if is_uuid_shaped(&stem) {
        stem
    } else {
        format!("file-{stem}")
    }
}

fn parse_timestamp(ts: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(ts).ok().map(|dt| dt.timestamp())
}

fn parse_user_event(
    value: &serde_json::Value,
    name_regex: &Regex,
    args_regex: &Regex,
    message_regex: &Regex,
) -> Option<Message> {
    let msg_content = value.get("message").and_then(|m| m.get("content"))?;

    let raw_content = match msg_content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(blocks) => {
            let has_tool_result = blocks
                .iter()
                .any(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_result"));
            if has_tool_result {
                return extract_tool_result_message(blocks);
            }
            extract_text_blocks(blocks)
        }
        _ => return None,
    };

    let cleaned = clean_command_tags(&raw_content, name_regex, args_regex, message_regex);
    let cleaned = cleaned.replace("\\\n", "\n");
    if cleaned.trim().is_empty() {
        return None;
    }
    Some(Message::new(0, Role::User, cleaned))
}

fn extract_tool_result_message(blocks: &[serde_json::Value]) -> Option<Message> {
    let mut parts = Vec::new();
    for block in blocks {
        if block.get("type").and_then(|t| t.as_str()) != Some("tool_result") {
            continue;
        }
        let tool_use_id = block.get("tool_use_id").and_then(|v| v.as_str()).unwrap_or("unknown");
        let text = match block.get("content") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|item| {
                    if item.get("type").and_then(|t| t.as_str()) == Some("text") {
                        item.get("text").and_then(|t| t.as_str())
                    } else {
                        None
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        };
        if text.is_empty() {
            parts.push(format!("[tool result for {tool_use_id}]"));
        } else {
            parts.push(format!("[tool result for {tool_use_id}]: {}", truncate_char_safe(&text, 200)));
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(Message::new(0, Role::ToolResult, parts.join("\n")))
}

fn truncate_char_safe(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

fn extract_text_blocks(blocks: &[serde_json::Value]) -> String {
    blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_assistant_event(
    value: &serde_json::Value,
    file_reference_regex: &Regex,
    file_references: &mut Vec<String>,
) -> Option<Message> {
    let content = value.get("message").and_then(|m| m.get("content"))?;

    let (text, tool_calls) = match content {
        serde_json::Value::String(s) => (s.clone(), Vec::new()),
        serde_json::Value::Array(blocks) => {
            let text = extract_text_blocks(blocks);
            let tool_calls: Vec<ToolCall> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_use"))
                .filter_map(|b| {
                    let name = b.get("name").and_then(|n| n.as_str())?.to_string();
                    let input = b.get("input").cloned();
                    if let Some(serde_json::Value::Object(obj)) = &input {
                        if let Some(path) = obj.get("file_path").and_then(|v| v.as_str()) {
                            file_references.push(path.to_string());
                        }
                    }
                    Some(ToolCall { name, input })
                })
                .collect();
            (text, tool_calls)
        }
        _ => return None,
    };

    scan_file_references(&text, file_reference_regex, file_references);

    if text.trim().is_empty() && tool_calls.is_empty() {
        return None;
    }

    let role = if text.trim().is_empty() && !tool_calls.is_empty() {
        Role::ToolUse
    } else {
        Role::Assistant
    };

    Some(Message::new(0, role, text).with_tool_calls(tool_calls))
}

fn parse_system_event(value: &serde_json::Value) -> Option<Message> {
    let subtype = value.get("subtype").and_then(|v| v.as_str()).unwrap_or("unknown");
    Some(Message::new(0, Role::Assistant, format!("system: {subtype}")))
}

fn scan_file_references(text: &str, regex: &Regex, file_references: &mut Vec<String>) {
    for m in regex.find_iter(text) {
        file_references.push(m.as_str().to_string());
    }
}

fn clean_command_tags(content: &str, name_regex: &Regex, args_regex: &Regex, message_regex: &Regex) -> String {
    if let Some(caps) = args_regex.captures(content) {
        if let Some(args_content) = caps.get(1) {
            let extracted = args_content.as_str().trim();
            if !extracted.is_empty() {
                return extracted.to_string();
            }
        }
    }

    let cleaned = name_regex.replace_all(content, "");
    let cleaned = message_regex.replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_fixture(content: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.jsonl");
        tokio::fs::write(&path, content).await.unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn parses_user_and_assistant_turns() {
        let content = r#"{"type":"user","uuid":"u1","timestamp":"2026-01-01T00:00:00Z","message":{"content":"Hello, Claude!"}}
{"type":"assistant","uuid":"u2","timestamp":"2026-01-01T00:00:01Z","message":{"content":[{"type":"text","text":"Hello! How can I help?"}]}}"#;
        let (_dir, path) = write_fixture(content).await;

        let conv = parse_transcript(&path).await.unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, Role::User);
        assert_eq!(conv.messages[0].content, "Hello, Claude!");
        assert_eq!(conv.messages[1].role, Role::Assistant);
        assert_eq!(conv.created_at, 1767225600);
        assert_eq!(conv.updated_at, 1767225601);
    }

    #[tokio::test]
    async fn skips_malformed_lines_without_failing() {
        let content = "{not json}\n{\"type\":\"user\",\"message\":{\"content\":\"hi\"}}";
        let (_dir, path) = write_fixture(content).await;

        let conv = parse_transcript(&path).await.unwrap();
        assert_eq!(conv.skipped_lines, 1);
        assert_eq!(conv.messages.len(), 1);
    }

    #[tokio::test]
    async fn empty_file_is_a_parse_error() {
        let (_dir, path) = write_fixture("").await;
        let err = parse_transcript(&path).await.unwrap_err();
        assert!(matches!(err, ParseError::EmptyFile { .. }));
    }

    #[tokio::test]
    async fn extracts_tool_calls_and_file_references() {
        let content = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Edit","input":{"file_path":"/Users/dev/project/src/main.rs"}}]}}"#;
        let (_dir, path) = write_fixture(content).await;

        let conv = parse_transcript(&path).await.unwrap();
        assert_eq!(conv.messages[0].role, Role::ToolUse);
        assert_eq!(conv.messages[0].tool_calls.len(), 1);
        assert_eq!(conv.messages[0].tool_calls[0].name, "Edit");
        assert!(conv.file_references.iter().any(|f| f.ends_with("main.rs")));
    }

    #[tokio::test]
    async fn session_id_falls_back_to_filename_stem() {
        let content = r#"{"type":"user","message":{"content":"hi"}}"#;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("550e8400-e29b-41d4-a716-446655440000.jsonl");
        tokio::fs::write(&path, content).await.unwrap();

        let conv = parse_transcript(&path).await.unwrap();
        assert_eq!(conv.session_id, "550e8400-e29b-41d4-a716-446655440000");
    }

    #[tokio::test]
    async fn session_id_uses_file_prefix_for_non_uuid_stems() {
        let content = r#"{"type":"user","message":{"content":"hi"}}"#;
        let (_dir, path) = write_fixture(content).await;
        let conv = parse_transcript(&path).await.unwrap();
        assert_eq!(conv.session_id, "file-session");
    }

    #[tokio::test]
    async fn cleans_command_tags_from_slash_commands() {
        let content = r#"{"type":"user","message":{"content":"<command-name>/commit</command-name>\n<command-args>fix the bug</command-args>"}}"#;
        let (_dir, path) = write_fixture(content).await;
        let conv = parse_transcript(&path).await.unwrap();
        assert_eq!(conv.messages[0].content, "fix the bug");
    }

    #[test]
    fn uuid_shape_detection() {
        assert!(is_uuid_shaped("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_uuid_shaped("not-a-uuid"));
        assert!(!is_uuid_shaped("session-123"));
    }
}
