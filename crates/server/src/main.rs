// crates/server/src/main.rs
//! Daemon entrypoint: wires the watcher, parser, writer, and git indexer
//! together and serves the tool surface until interrupted.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conversant_server::writer::{UpsertRepositoryArgs, Writer};
use conversant_server::Config;
use conversant_store::Store;
use conversant_watcher::{DirectoryWatcher, FileEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "conversant", about = "Always-on indexer for AI-assistant transcripts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: watch, ingest, and serve tool requests (default).
    Serve,
    /// Force a full rescan of the transcript root, ignoring the watcher's debounce.
    Reindex,
    /// Print the `index_stats` counters and exit.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = Config::from_env();
    let store = Arc::new(Store::open(&config.db_path).await.context("opening store")?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, store).await,
        Commands::Reindex => reindex(config, store).await,
        Commands::Stats => print_stats(store).await,
    }
}

async fn print_stats(store: Arc<Store>) -> Result<()> {
    for name in ["schema_version", "total_conversations", "total_messages", "last_incremental_index"] {
        let value = store.stat(name).await?;
        println!("{name} = {value}");
    }
    Ok(())
}

async fn reindex(config: Config, store: Arc<Store>) -> Result<()> {
    let (writer, writer_task) = Writer::spawn(store, 64);
    let files = full_scan(&config.transcript_root);
    info!(count = files.len(), "full rescan of transcript root");
    for path in files {
        ingest_file(&writer, &path).await;
    }
    drop(writer);
    writer_task.await.ok();
    Ok(())
}

async fn serve(config: Config, store: Arc<Store>) -> Result<()> {
    let (writer, writer_task) = Writer::spawn(store, 256);
    let (tx, mut rx) = mpsc::channel::<FileEvent>(256);

    let watcher = DirectoryWatcher::start(&config.transcript_root, tx, config.debounce_window)
        .context("starting directory watcher")?;

    for path in full_scan(&config.transcript_root) {
        ingest_file(&writer, &path).await;
    }
    info!(root = %config.transcript_root.display(), "initial scan complete, watching for changes");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(FileEvent::Changed(path)) => {
                        watcher.mark_in_flight(&path);
                        ingest_file(&writer, &path).await;
                        watcher.mark_done(&path);
                    }
                    Some(FileEvent::Removed(path)) => {
                        debug!(path = %path.display(), "transcript removed; leaving indexed history in place");
                    }
                    None => break,
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                watcher.stop();
                break;
            }
        }
    }

    drop(writer);
    writer_task.await.ok();
    Ok(())
}

/// Every `.jsonl` file under every project subdirectory, regardless of age —
/// used by `reindex` and at startup, unlike the watcher's 24h-bounded scan.
fn full_scan(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let Ok(read_dir) = std::fs::read_dir(root) else {
        return files;
    };
    for project_entry in read_dir.flatten() {
        let project_path = project_entry.path();
        if !project_path.is_dir() {
            continue;
        }
        let Ok(sub_read) = std::fs::read_dir(&project_path) else {
            continue;
        };
        for file_entry in sub_read.flatten() {
            let file_path = file_entry.path();
            if file_path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                files.push(file_path);
            }
        }
    }
    files
}

async fn ingest_file(writer: &Writer, path: &std::path::Path) {
    let conversation = match conversant_core::parser::parse_transcript(path).await {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse transcript");
            return;
        }
    };

    let project_dir = path.parent().and_then(|p| p.file_name()).map(|n| n.to_string_lossy().to_string());
    let conversation = match project_dir {
        Some(encoded) => {
            let resolved = conversant_core::resolve_project_path(&encoded);
            conversant_core::parser::with_project(conversation, resolved.full_path, resolved.display_name)
        }
        None => conversation,
    };

    let project_path = conversation.project_path.clone();

    match writer.ingest_transcript(conversation).await {
        Ok(outcome) => {
            debug!(path = %path.display(), conversation_id = outcome.conversation_id, is_new = outcome.is_new, "ingested transcript");
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to ingest transcript");
            return;
        }
    }

    if !project_path.is_empty() {
        index_git_context(writer, &project_path).await;
    }
}

/// Best-effort git discovery and shallow commit-history ingest for a
/// newly-touched project. Non-fatal: most transcript directories aren't git
/// repositories, and a missing repo is not a reason to drop the ingest.
async fn index_git_context(writer: &Writer, project_path: &str) {
    let path = std::path::PathBuf::from(project_path);
    let Ok(discovered) = conversant_git::blocking::discover(path.clone()).await else {
        return;
    };
    let remote_url = conversant_git::blocking::remote_url(path.clone()).await.ok().flatten();
    let current_branch = conversant_git::blocking::current_branch(path.clone()).await.ok().flatten();

    let repo_id = writer
        .upsert_repository(UpsertRepositoryArgs {
            project_path: project_path.to_string(),
            discovered,
            remote_url,
            current_branch,
            scanned_at: now_secs(),
        })
        .await;
    let repo_id = match repo_id {
        Ok(id) => id,
        Err(e) => {
            warn!(project_path, error = %e, "failed to record git repository");
            return;
        }
    };

    let history = conversant_git::blocking::commit_history(
        path,
        conversant_git::CommitHistoryOptions { limit: 20, branch: None },
    )
    .await;
    let Ok(history) = history else {
        return;
    };
    for commit in history {
        if let Err(e) = writer.insert_commit(repo_id, commit).await {
            warn!(project_path, error = %e, "failed to record commit");
        }
    }
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
