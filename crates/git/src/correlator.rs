// crates/git/src/correlator.rs
//! Correlator (C8): given a file-modification signal, finds the conversation
//! session most plausibly responsible for it by scanning recent transcripts
//! for a matching tool-use event.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant, UNIX_EPOCH};

use conversant_store::Store;
use serde_json::Value;
use sqlx::Row;

use crate::GitError;

const CACHE_TTL: Duration = Duration::from_secs(60);
const EDIT_TOOLS: &[&str] = &["Edit", "Write", "MultiEdit", "NotebookEdit"];

#[derive(Debug, Clone)]
pub struct CorrelationResult {
    pub session_id: String,
    pub confidence: f64,
    pub description: String,
}

struct CacheEntry {
    result: Option<CorrelationResult>,
    cached_at: Instant,
}

/// Caches (repository_path, file_path) -> correlation outcome for 60s,
/// evicting expired entries lazily on each lookup.
pub struct Correlator {
    cache: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn correlate(
        &self,
        store: &Store,
        transcripts_root: &Path,
        repository_path: &str,
        file_path: &str,
        event_timestamp: i64,
        window_secs: i64,
        min_confidence: f64,
    ) -> Result<Option<CorrelationResult>, GitError> {
        let cache_key = (repository_path.to_string(), file_path.to_string());

        {
            let mut cache = self.cache.lock().unwrap();
            cache.retain(|_, entry| entry.cached_at.elapsed() < CACHE_TTL);
            if let Some(entry) = cache.get(&cache_key) {
                return Ok(entry.result.clone());
            }
        }

        let target_basename = Path::new(file_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file_path.to_string());

        let candidates = scan_recent_transcripts(transcripts_root, &target_basename, event_timestamp, window_secs).await?;

        let result = match candidates.into_iter().max_by_key(|c| c.timestamp) {
            Some(best) => {
                let delta = (event_timestamp - best.timestamp).unsigned_abs() as f64;
                let confidence = (1.0 - delta / window_secs.max(1) as f64).max(0.0);
                if confidence < min_confidence {
                    None
                } else {
                    let description = describe_session(store, &best.session_id).await?;
                    Some(CorrelationResult {
                        session_id: best.session_id,
                        confidence,
                        description,
                    })
                }
            }
            None => None,
        };

        let mut cache = self.cache.lock().unwrap();
        cache.insert(
            cache_key,
            CacheEntry {
                result: result.clone(),
                cached_at: Instant::now(),
            },
        );

        Ok(result)
    }
}

struct Candidate {
    session_id: String,
    timestamp: i64,
}

async fn scan_recent_transcripts(
    transcripts_root: &Path,
    target_basename: &str,
    event_timestamp: i64,
    window_secs: i64,
) -> Result<Vec<Candidate>, GitError> {
    let mtime_bound = Duration::from_secs((window_secs.max(0) as u64) * 2);
    let event_time = UNIX_EPOCH + Duration::from_secs(event_timestamp.max(0) as u64);

    let mut candidates = Vec::new();
    let mut project_dirs = match tokio::fs::read_dir(transcripts_root).await {
        Ok(rd) => rd,
        Err(_) => return Ok(candidates),
    };

    while let Ok(Some(project_entry)) = project_dirs.next_entry().await {
        if !project_entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let mut files = match tokio::fs::read_dir(project_entry.path()).await {
            Ok(rd) => rd,
            Err(_) => continue,
        };

        while let Ok(Some(file_entry)) = files.next_entry().await {
            let path = file_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Ok(metadata) = file_entry.metadata().await else { continue };
            let Ok(modified) = metadata.modified() else { continue };

            let within_window = modified
                .duration_since(event_time)
                .or_else(|_| event_time.duration_since(modified))
                .map(|d| d <= mtime_bound)
                .unwrap_or(false);
            if !within_window {
                continue;
            }

            if let Some(candidate) = scan_file_for_edit(&path, target_basename).await {
                candidates.push(candidate);
            }
        }
    }

    Ok(candidates)
}

async fn scan_file_for_edit(path: &Path, target_basename: &str) -> Option<Candidate> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    let lines: Vec<&str> = content.lines().collect();
    let session_id = lines
        .first()
        .and_then(|l| serde_json::from_str::<Value>(l).ok())
        .and_then(|v| v.get("sessionId").and_then(|s| s.as_str()).map(str::to_string))
        .unwrap_or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default());

    for line in lines.iter().rev() {
        let Ok(value) = serde_json::from_str::<Value>(line) else { continue };
        let Some(content_blocks) = value.pointer("/message/content").and_then(|c| c.as_array()) else { continue };

        for block in content_blocks {
            if block.get("type").and_then(|t| t.as_str()) != Some("tool_use") {
                continue;
            }
            let Some(tool_name) = block.get("name").and_then(|n| n.as_str()) else { continue };
            if !EDIT_TOOLS.contains(&tool_name) {
                continue;
            }
            let Some(file_path) = block.pointer("/input/file_path").and_then(|f| f.as_str()) else { continue };
            let basename = Path::new(file_path).file_name().map(|n| n.to_string_lossy().to_string());
            if basename.as_deref() != Some(target_basename) {
                continue;
            }

            let timestamp = value
                .get("timestamp")
                .and_then(|t| t.as_str())
                .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
                .map(|dt| dt.timestamp())
                .unwrap_or(0);

            return Some(Candidate { session_id, timestamp });
        }
    }

    None
}

async fn describe_session(store: &Store, session_id: &str) -> Result<String, GitError> {
    let row = sqlx::query(
        "SELECT m.content, m.content_summary
         FROM messages m
         JOIN conversations c ON c.id = m.conversation_id
         WHERE c.session_id = ? AND m.role = 'user'
         ORDER BY m.message_index ASC LIMIT 1",
    )
    .bind(session_id)
    .fetch_optional(store.pool())
    .await?;

    Ok(match row {
        Some(row) => {
            let summary: Option<String> = row.get("content_summary");
            match summary {
                Some(s) if !s.is_empty() => s,
                _ => {
                    let content: String = row.get("content");
                    content.chars().take(100).collect()
                }
            }
        }
        None => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    async fn write_transcript(dir: &Path, project: &str, file: &str, lines: &[String]) {
        let project_dir = dir.join(project);
        tokio::fs::create_dir_all(&project_dir).await.unwrap();
        tokio::fs::write(project_dir.join(file), lines.join("\n")).await.unwrap();
    }

    fn tool_use_line(session_id: &str, timestamp: &str, file_path: &str) -> String {
        serde_json::json!({
            "sessionId": session_id,
            "timestamp": timestamp,
            "message": {
                "role": "assistant",
                "content": [{"type": "tool_use", "name": "Edit", "input": {"file_path": file_path}}]
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn correlate_finds_matching_edit_event() {
        let store = Store::open_in_memory().await.unwrap();
        let tmp = tempfile::tempdir().unwrap();

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        let ts = chrono::DateTime::from_timestamp(now, 0).unwrap().to_rfc3339();
        write_transcript(
            tmp.path(),
            "proj",
            "sess.jsonl",
            &[tool_use_line("sess-1", &ts, "/repo/src/main.rs")],
        )
        .await;

        let correlator = Correlator::new();
        let result = correlator
            .correlate(&store, tmp.path(), "/repo", "/repo/src/main.rs", now, 20, 0.5)
            .await
            .unwrap();

        assert!(result.is_some());
        assert_eq!(result.unwrap().session_id, "sess-1");
    }

    #[tokio::test]
    async fn correlate_returns_none_when_no_match() {
        let store = Store::open_in_memory().await.unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;

        let correlator = Correlator::new();
        let result = correlator
            .correlate(&store, tmp.path(), "/repo", "/repo/src/main.rs", now, 20, 0.5)
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn correlate_caches_result_for_repeated_lookups() {
        let store = Store::open_in_memory().await.unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        let ts = chrono::DateTime::from_timestamp(now, 0).unwrap().to_rfc3339();
        write_transcript(
            tmp.path(),
            "proj",
            "sess.jsonl",
            &[tool_use_line("sess-1", &ts, "/repo/src/main.rs")],
        )
        .await;

        let correlator = Correlator::new();
        let first = correlator
            .correlate(&store, tmp.path(), "/repo", "/repo/src/main.rs", now, 20, 0.5)
            .await
            .unwrap();

        tokio::fs::remove_dir_all(tmp.path().join("proj")).await.unwrap();

        let second = correlator
            .correlate(&store, tmp.path(), "/repo", "/repo/src/main.rs", now, 20, 0.5)
            .await
            .unwrap();

        assert_eq!(first.unwrap().session_id, second.unwrap().session_id);
    }
}
