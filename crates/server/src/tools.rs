// crates/server/src/tools.rs
//! Tool Surface (C9): argument validation, dispatch to the query engine and
//! git indexer, and uniform error handling. Transport-agnostic — callers
//! own the wire framing; this module only implements the handler contract.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use conversant_search::{Logic, SearchEngine, SearchMode, SearchOptions, SummaryMode};
use conversant_store::Store;
use serde_json::{json, Value};
use sqlx::Row;

use crate::error::{ToolError, ToolResult};
use crate::writer::{CreateRestorePointArgs, UpsertRepositoryArgs, Writer};

/// One method per published tool (§6.2), plus a name-based fallback for
/// transports that dispatch by string (stdio JSON-RPC, an MCP host, etc.).
pub trait ToolHandler {
    async fn search_conversations(&self, args: Value) -> ToolResult<Value>;
    async fn get_conversation_context(&self, args: Value) -> ToolResult<Value>;
    async fn list_recent_conversations(&self, args: Value) -> ToolResult<Value>;
    async fn find_similar_solutions(&self, args: Value) -> ToolResult<Value>;
    async fn list_restore_points(&self, args: Value) -> ToolResult<Value>;
    async fn create_restore_point(&self, args: Value) -> ToolResult<Value>;
    async fn preview_restore(&self, args: Value) -> ToolResult<Value>;
    async fn get_git_context(&self, args: Value) -> ToolResult<Value>;

    async fn dispatch(&self, name: &str, args: Value) -> ToolResult<Value> {
        match name {
            "search_conversations" => self.search_conversations(args).await,
            "get_conversation_context" => self.get_conversation_context(args).await,
            "list_recent_conversations" => self.list_recent_conversations(args).await,
            "find_similar_solutions" => self.find_similar_solutions(args).await,
            "list_restore_points" => self.list_restore_points(args).await,
            "create_restore_point" => self.create_restore_point(args).await,
            "preview_restore" => self.preview_restore(args).await,
            "get_git_context" => self.get_git_context(args).await,
            other => Err(ToolError::MethodNotFound(other.to_string())),
        }
    }
}

/// Reads go straight against the pooled connection; every mutation is
/// funneled through the single-writer task so transcript ingest and
/// tool-triggered git writes never interleave mid-transaction.
pub struct ConversantTools {
    store: Arc<Store>,
    writer: Writer,
}

impl ConversantTools {
    pub fn new(store: Arc<Store>, writer: Writer) -> Self {
        Self { store, writer }
    }
}

fn require_str<'a>(args: &'a Value, key: &str) -> ToolResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArgument(format!("missing required field `{key}`")))
}

fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn opt_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn opt_f64(args: &Value, key: &str, default: f64) -> f64 {
    args.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn opt_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

impl ToolHandler for ConversantTools {
    async fn search_conversations(&self, args: Value) -> ToolResult<Value> {
        let query = require_str(&args, "query")?;

        let search_mode = match opt_str(&args, "search_mode").unwrap_or("mixed") {
            "fuzzy" => SearchMode::Fuzzy,
            "exact" => SearchMode::Exact,
            "mixed" => SearchMode::Mixed,
            other => return Err(ToolError::InvalidArgument(format!("unknown search_mode: {other}"))),
        };
        let logic = match opt_str(&args, "logic").unwrap_or("OR") {
            "OR" | "or" => Logic::Or,
            "AND" | "and" => Logic::And,
            other => return Err(ToolError::InvalidArgument(format!("unknown logic: {other}"))),
        };

        let opts = SearchOptions {
            search_mode,
            fuzzy_threshold: opt_f64(&args, "fuzzy_threshold", 0.6),
            logic,
            project_filter: opt_str(&args, "project_filter").map(str::to_string),
            timeframe: opt_str(&args, "timeframe").map(str::to_string),
            limit: opt_u64(&args, "limit", 10) as usize,
            offset: 0,
        };

        let engine = SearchEngine::new(&self.store);
        let response = engine.search(query, &opts).await?;
        Ok(serde_json::to_value(response).expect("SearchResponse always serializes"))
    }

    async fn get_conversation_context(&self, args: Value) -> ToolResult<Value> {
        let session_id = require_str(&args, "session_id")?;
        let page = opt_u64(&args, "page", 1) as usize;
        let page_size = opt_u64(&args, "page_size", 50) as usize;
        let max_tokens = opt_u64(&args, "max_tokens", 20_000) as i64;
        let summary_mode = match opt_str(&args, "summary_mode").unwrap_or("full") {
            "full" => SummaryMode::Full,
            "condensed" => SummaryMode::Condensed,
            "key_points_only" => SummaryMode::KeyPointsOnly,
            other => return Err(ToolError::InvalidArgument(format!("unknown summary_mode: {other}"))),
        };
        let content_types: Option<Vec<String>> = args
            .get("content_types")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect());
        let content_type_refs: Option<Vec<&str>> =
            content_types.as_ref().map(|v| v.iter().map(String::as_str).collect());

        let engine = SearchEngine::new(&self.store);
        let context = engine
            .conversation_context(session_id, page, page_size, max_tokens, content_type_refs.as_deref(), summary_mode)
            .await?;

        match context {
            Some(context) => Ok(serde_json::to_value(context).expect("ConversationContext always serializes")),
            None => Err(ToolError::NotFound(format!("unknown session_id: {session_id}"))),
        }
    }

    async fn list_recent_conversations(&self, args: Value) -> ToolResult<Value> {
        let timeframe = opt_str(&args, "timeframe").unwrap_or("today");
        let lower_bound = conversant_search::query::parse_timeframe(timeframe);
        let project_filter = opt_str(&args, "project_filter").map(|p| format!("%{p}%"));
        let limit = opt_u64(&args, "limit", 20) as i64;

        let rows = sqlx::query(
            "SELECT session_id, project_path, project_name, created_at, updated_at,
                    message_count, total_tokens
             FROM conversations
             WHERE (? IS NULL OR created_at >= ?)
               AND (? IS NULL OR project_path LIKE ?)
             ORDER BY updated_at DESC
             LIMIT ?",
        )
        .bind(lower_bound)
        .bind(lower_bound)
        .bind(&project_filter)
        .bind(&project_filter)
        .bind(limit)
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| ToolError::from(conversant_store::DbError::from(e)))?;

        let conversations: Vec<Value> = rows
            .into_iter()
            .map(|row| {
                json!({
                    "sessionId": row.get::<String, _>("session_id"),
                    "projectPath": row.get::<String, _>("project_path"),
                    "projectName": row.get::<String, _>("project_name"),
                    "createdAt": row.get::<i64, _>("created_at"),
                    "updatedAt": row.get::<i64, _>("updated_at"),
                    "messageCount": row.get::<i64, _>("message_count"),
                    "totalTokens": row.get::<i64, _>("total_tokens"),
                })
            })
            .collect();

        Ok(json!({ "conversations": conversations }))
    }

    async fn find_similar_solutions(&self, args: Value) -> ToolResult<Value> {
        let problem_description = require_str(&args, "problem_description")?;
        let confidence_threshold = opt_f64(&args, "confidence_threshold", 0.6);

        let engine = SearchEngine::new(&self.store);
        let results = engine.similar_solutions(problem_description, confidence_threshold).await?;
        Ok(serde_json::to_value(results).expect("Vec<SimilarSolution> always serializes"))
    }

    async fn list_restore_points(&self, args: Value) -> ToolResult<Value> {
        let project_path = require_str(&args, "project_path")?;
        let repository = conversant_git::get_repository(&self.store, project_path)
            .await?
            .ok_or_else(|| ToolError::Precondition(format!("no known git repository for {project_path}")))?;

        let timeframe = opt_str(&args, "timeframe");
        let filters = conversant_git::RestorePointFilters {
            include_auto_generated: opt_bool(&args, "include_auto_generated", true),
            created_after: timeframe.and_then(conversant_search::query::parse_timeframe),
        };
        let limit = opt_u64(&args, "limit", 50).min(100) as usize;

        let points = conversant_git::list_restore_points(&self.store, repository.id, &filters).await?;
        let points: Vec<Value> = points
            .into_iter()
            .take(limit)
            .map(|p| {
                json!({
                    "id": p.id,
                    "commitHash": p.commit_hash,
                    "label": p.label,
                    "description": p.description,
                    "autoGenerated": p.auto_generated,
                    "testStatus": p.test_status,
                    "createdAt": p.created_at,
                    "createdBy": p.created_by,
                })
            })
            .collect();

        Ok(json!({ "restorePoints": points }))
    }

    async fn create_restore_point(&self, args: Value) -> ToolResult<Value> {
        let project_path = require_str(&args, "project_path")?;
        let label = require_str(&args, "label")?;
        let description = opt_str(&args, "description");
        let auto_generated = opt_bool(&args, "auto_generated", false);
        let test_status = opt_str(&args, "test_status").unwrap_or("unknown");

        let path = PathBuf::from(project_path);
        let discovered = conversant_git::blocking::discover(path.clone()).await?;
        let commit_hash = conversant_git::blocking::current_head(path.clone())
            .await?
            .ok_or_else(|| ToolError::Precondition("repository has no commits yet".to_string()))?;
        let remote_url = conversant_git::blocking::remote_url(path.clone()).await?;
        let current_branch = conversant_git::blocking::current_branch(path).await?;

        let repository_id = self
            .writer
            .upsert_repository(UpsertRepositoryArgs {
                project_path: project_path.to_string(),
                discovered,
                remote_url,
                current_branch,
                scanned_at: now_secs(),
            })
            .await?;

        let id = self
            .writer
            .create_restore_point(CreateRestorePointArgs {
                repository_id,
                commit_hash: commit_hash.clone(),
                label: label.to_string(),
                description: description.map(str::to_string),
                auto_generated,
                test_status: test_status.to_string(),
                created_at: now_secs(),
                created_by: None,
            })
            .await?;

        Ok(json!({ "id": id, "commitHash": commit_hash, "label": label }))
    }

    async fn preview_restore(&self, args: Value) -> ToolResult<Value> {
        let project_path = require_str(&args, "project_path")?;
        let restore_point_id = args
            .get("restore_point_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| ToolError::InvalidArgument("missing required field `restore_point_id`".to_string()))?;

        let restore_point = conversant_git::get_restore_point(&self.store, restore_point_id)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("unknown restore point: {restore_point_id}")))?;

        let files = conversant_git::blocking::preview_restore(PathBuf::from(project_path), restore_point.commit_hash.clone()).await?;
        let files: Vec<Value> = files
            .into_iter()
            .map(|f| json!({ "path": f.path, "changeStatus": f.change_status }))
            .collect();

        Ok(json!({ "commitHash": restore_point.commit_hash, "files": files }))
    }

    async fn get_git_context(&self, args: Value) -> ToolResult<Value> {
        let project_path = require_str(&args, "project_path")?;
        let limit = opt_u64(&args, "limit", 20) as usize;
        let path = PathBuf::from(project_path);

        let discovered = conversant_git::blocking::discover(path.clone()).await?;
        let remote_url = conversant_git::blocking::remote_url(path.clone()).await?;
        let current_branch = conversant_git::blocking::current_branch(path.clone()).await?;
        let status = conversant_git::blocking::working_directory_status(path.clone()).await?;

        let repository_id = self
            .writer
            .upsert_repository(UpsertRepositoryArgs {
                project_path: project_path.to_string(),
                discovered: discovered.clone(),
                remote_url: remote_url.clone(),
                current_branch: current_branch.clone(),
                scanned_at: now_secs(),
            })
            .await?;

        let history = conversant_git::blocking::commit_history(
            path,
            conversant_git::CommitHistoryOptions { limit, branch: None },
        )
        .await?;
        for commit in &history {
            self.writer.insert_commit(repository_id, commit.clone()).await?;
        }

        let commits: Vec<Value> = history
            .into_iter()
            .map(|c| {
                json!({
                    "hash": c.hash,
                    "branch": c.branch,
                    "authoredAt": c.authored_at,
                    "authorName": c.author_name,
                    "authorEmail": c.author_email,
                    "message": c.message,
                    "isMerge": c.is_merge,
                    "insertions": c.insertions,
                    "deletions": c.deletions,
                    "filesChanged": c.files_changed,
                })
            })
            .collect();

        Ok(json!({
            "repository": {
                "projectPath": project_path,
                "currentBranch": current_branch,
                "remoteUrl": remote_url,
                "isMonorepoSubdirectory": discovered.is_monorepo_subdirectory,
                "workingTreeClean": status.is_clean(),
            },
            "commits": commits,
        }))
    }
}
