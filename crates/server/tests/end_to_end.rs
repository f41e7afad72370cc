// crates/server/tests/end_to_end.rs
//! End-to-end scenario coverage: cold start, incremental ingest, search, and
//! the restore-point lifecycle, driven through the public tool surface the
//! way a real caller would use it rather than through internal crate APIs.

use std::process::Command;
use std::sync::Arc;

use chrono::Utc;
use conversant_core::parser::{parse_transcript, with_project};
use conversant_server::writer::Writer;
use conversant_server::{ConversantTools, ToolHandler};
use conversant_store::Store;
use serde_json::json;
use tempfile::TempDir;

/// Transcript timestamps are relative to the moment the test runs, not a
/// fixed date — `list_recent_conversations`'s timeframe filters are all
/// relative to `Utc::now()`, so a hardcoded past date would silently fall
/// outside "last week" whenever the suite runs far enough in the future.
fn rfc3339_now_plus_secs(offset: i64) -> String {
    (Utc::now() + chrono::Duration::seconds(offset)).to_rfc3339()
}

fn init_repo_with_commit(dir: &std::path::Path) {
    let run = |args: &[&str]| {
        Command::new("git").args(args).current_dir(dir).status().unwrap();
    };
    run(&["init", "-q"]);
    run(&["config", "user.email", "test@example.com"]);
    run(&["config", "user.name", "Test"]);
    std::fs::write(dir.join("a.txt"), "hello").unwrap();
    run(&["add", "a.txt"]);
    run(&["commit", "-q", "-m", "initial commit"]);
}

async fn tools_over(store: Arc<Store>) -> (ConversantTools, Writer) {
    let (writer, _handle) = Writer::spawn(store.clone(), 32);
    (ConversantTools::new(store, writer.clone()), writer)
}

async fn ingest(writer: &Writer, project_dir: &std::path::Path, transcript_path: &std::path::Path) {
    let conversation = parse_transcript(transcript_path).await.unwrap();
    let conversation = with_project(
        conversation,
        project_dir.display().to_string(),
        project_dir.file_name().unwrap().to_string_lossy().to_string(),
    );
    writer.ingest_transcript(conversation).await.unwrap();
}

fn write_transcript(project_dir: &std::path::Path, session_id: &str, turns: &str) -> std::path::PathBuf {
    let path = project_dir.join(format!("{session_id}.jsonl"));
    std::fs::write(&path, turns).unwrap();
    path
}

#[tokio::test]
async fn cold_start_then_incremental_ingest_then_search() {
    let project_dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let (tools, writer) = tools_over(store).await;

    let transcript = write_transcript(
        project_dir.path(),
        "11111111-1111-4111-8111-111111111111",
        &format!(
            r#"{{"type":"user","uuid":"u1","timestamp":"{}","message":{{"content":"how do I fix the auth bug?"}}}}
{{"type":"assistant","uuid":"u2","timestamp":"{}","message":{{"content":[{{"type":"text","text":"check the token refresh path"}}]}}}}"#,
            rfc3339_now_plus_secs(-60),
            rfc3339_now_plus_secs(-59),
        ),
    );
    ingest(&writer, project_dir.path(), &transcript).await;

    let found = tools.search_conversations(json!({ "query": "auth bug" })).await.unwrap();
    assert_eq!(found["totalConversations"], 1);

    // Incremental: the same file gets a second turn appended and is
    // re-ingested — the conversation is updated in place, not duplicated.
    std::fs::write(
        &transcript,
        format!(
            r#"{{"type":"user","uuid":"u1","timestamp":"{}","message":{{"content":"how do I fix the auth bug?"}}}}
{{"type":"assistant","uuid":"u2","timestamp":"{}","message":{{"content":[{{"type":"text","text":"check the token refresh path"}}]}}}}
{{"type":"user","uuid":"u3","timestamp":"{}","message":{{"content":"that fixed it, thanks"}}}}"#,
            rfc3339_now_plus_secs(-60),
            rfc3339_now_plus_secs(-59),
            rfc3339_now_plus_secs(-1),
        ),
    )
    .unwrap();
    ingest(&writer, project_dir.path(), &transcript).await;

    let context = tools
        .get_conversation_context(json!({ "session_id": "11111111-1111-4111-8111-111111111111" }))
        .await
        .unwrap();
    assert_eq!(context["messages"].as_array().unwrap().len(), 3);

    let recent = tools.list_recent_conversations(json!({ "timeframe": "last week" })).await.unwrap();
    assert_eq!(recent["conversations"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn exact_then_fuzzy_search_both_find_the_same_conversation() {
    let project_dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let (tools, writer) = tools_over(store).await;

    let transcript = write_transcript(
        project_dir.path(),
        "session",
        r#"{"type":"user","message":{"content":"investigate the connection timeout"}}"#,
    );
    ingest(&writer, project_dir.path(), &transcript).await;

    let exact = tools
        .search_conversations(json!({ "query": "connection timeout", "search_mode": "exact" }))
        .await
        .unwrap();
    assert_eq!(exact["totalConversations"], 1);

    let fuzzy = tools
        .search_conversations(json!({ "query": "connecton timout", "search_mode": "fuzzy" }))
        .await
        .unwrap();
    assert_eq!(fuzzy["totalConversations"], 1);
}

#[tokio::test]
async fn restore_point_lifecycle_create_list_and_preview() {
    let repo_dir = TempDir::new().unwrap();
    init_repo_with_commit(repo_dir.path());

    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let (tools, _writer) = tools_over(store).await;

    let project_path = repo_dir.path().display().to_string();
    let created = tools
        .create_restore_point(json!({
            "project_path": project_path,
            "label": "before-refactor",
            "test_status": "passing",
        }))
        .await
        .unwrap();
    assert_eq!(created["label"], "before-refactor");

    let listed = tools.list_restore_points(json!({ "project_path": project_path })).await.unwrap();
    let points = listed["restorePoints"].as_array().unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["label"], "before-refactor");

    let restore_point_id = points[0]["id"].as_i64().unwrap();

    // No changes since the restore point was taken at HEAD, so the dry-run
    // preview reports nothing to restore.
    let preview = tools
        .preview_restore(json!({ "project_path": project_path, "restore_point_id": restore_point_id }))
        .await
        .unwrap();
    assert_eq!(preview["files"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn create_restore_point_rejects_duplicate_labels() {
    let repo_dir = TempDir::new().unwrap();
    init_repo_with_commit(repo_dir.path());

    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let (tools, _writer) = tools_over(store).await;
    let project_path = repo_dir.path().display().to_string();

    tools
        .create_restore_point(json!({ "project_path": project_path, "label": "checkpoint" }))
        .await
        .unwrap();

    let second = tools
        .create_restore_point(json!({ "project_path": project_path, "label": "checkpoint" }))
        .await;
    assert!(second.is_err());
}

#[tokio::test]
async fn get_git_context_reports_history_and_working_tree_state() {
    let repo_dir = TempDir::new().unwrap();
    init_repo_with_commit(repo_dir.path());

    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let (tools, _writer) = tools_over(store).await;
    let project_path = repo_dir.path().display().to_string();

    let context = tools.get_git_context(json!({ "project_path": project_path })).await.unwrap();
    assert_eq!(context["commits"].as_array().unwrap().len(), 1);
    assert_eq!(context["repository"]["workingTreeClean"], true);
}
