// crates/server/src/writer.rs
//! Single-writer task: the watcher, the correlator, and the git indexer all
//! want to mutate the store from independent tasks, but transcript upserts
//! and git upserts must never interleave mid-transaction. One task owns the
//! `Store` and drains a bounded command queue; every other task only ever
//! holds a `Writer` handle (a cheap `Sender` clone).

use std::sync::Arc;

use conversant_core::types::ParsedConversation;
use conversant_git::{CommitInfo, DiscoveredRepo};
use conversant_store::{DbError, Store, UpsertOutcome};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum WriterError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Git(#[from] conversant_git::GitError),

    #[error("writer task is no longer running")]
    Closed,
}

pub struct UpsertRepositoryArgs {
    pub project_path: String,
    pub discovered: DiscoveredRepo,
    pub remote_url: Option<String>,
    pub current_branch: Option<String>,
    pub scanned_at: i64,
}

pub struct CreateRestorePointArgs {
    pub repository_id: i64,
    pub commit_hash: String,
    pub label: String,
    pub description: Option<String>,
    pub auto_generated: bool,
    pub test_status: String,
    pub created_at: i64,
    pub created_by: Option<String>,
}

pub struct LinkConversationArgs {
    pub conversation_id: i64,
    pub repository_id: i64,
    pub commit_id: Option<i64>,
    pub link_type: String,
    pub confidence: f64,
}

/// Every mutating operation the daemon performs, funneled through one queue.
pub enum WriteCommand {
    IngestTranscript {
        conversation: Box<ParsedConversation>,
        respond_to: oneshot::Sender<Result<UpsertOutcome, WriterError>>,
    },
    UpsertRepository {
        args: Box<UpsertRepositoryArgs>,
        respond_to: oneshot::Sender<Result<i64, WriterError>>,
    },
    InsertCommit {
        repository_id: i64,
        commit: Box<CommitInfo>,
        respond_to: oneshot::Sender<Result<i64, WriterError>>,
    },
    CreateRestorePoint {
        args: Box<CreateRestorePointArgs>,
        respond_to: oneshot::Sender<Result<i64, WriterError>>,
    },
    LinkConversationToGit {
        args: LinkConversationArgs,
        respond_to: oneshot::Sender<Result<(), WriterError>>,
    },
}

/// A cheaply-cloneable handle to the single writer task.
#[derive(Clone)]
pub struct Writer {
    tx: mpsc::Sender<WriteCommand>,
}

impl Writer {
    /// Spawn the writer task, returning a handle plus its `JoinHandle`.
    /// Queue depth is bounded (per §5) so a stalled writer backpressures
    /// producers rather than growing memory without bound.
    pub fn spawn(store: Arc<Store>, queue_depth: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        let handle = tokio::spawn(run(store, rx));
        (Self { tx }, handle)
    }

    pub async fn ingest_transcript(&self, conversation: ParsedConversation) -> Result<UpsertOutcome, WriterError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(WriteCommand::IngestTranscript { conversation: Box::new(conversation), respond_to }).await?;
        rx.await.map_err(|_| WriterError::Closed)?
    }

    pub async fn upsert_repository(&self, args: UpsertRepositoryArgs) -> Result<i64, WriterError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(WriteCommand::UpsertRepository { args: Box::new(args), respond_to }).await?;
        rx.await.map_err(|_| WriterError::Closed)?
    }

    pub async fn insert_commit(&self, repository_id: i64, commit: CommitInfo) -> Result<i64, WriterError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(WriteCommand::InsertCommit { repository_id, commit: Box::new(commit), respond_to }).await?;
        rx.await.map_err(|_| WriterError::Closed)?
    }

    pub async fn create_restore_point(&self, args: CreateRestorePointArgs) -> Result<i64, WriterError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(WriteCommand::CreateRestorePoint { args: Box::new(args), respond_to }).await?;
        rx.await.map_err(|_| WriterError::Closed)?
    }

    pub async fn link_conversation_to_git(&self, args: LinkConversationArgs) -> Result<(), WriterError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(WriteCommand::LinkConversationToGit { args, respond_to }).await?;
        rx.await.map_err(|_| WriterError::Closed)?
    }

    async fn send(&self, command: WriteCommand) -> Result<(), WriterError> {
        self.tx.send(command).await.map_err(|_| WriterError::Closed)
    }
}

async fn run(store: Arc<Store>, mut rx: mpsc::Receiver<WriteCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            WriteCommand::IngestTranscript { conversation, respond_to } => {
                let result = conversant_store::upsert_conversation(&store, &conversation).await.map_err(WriterError::from);
                reply(respond_to, result);
            }
            WriteCommand::UpsertRepository { args, respond_to } => {
                let result = conversant_git::upsert_repository(
                    &store,
                    &args.project_path,
                    &args.discovered,
                    args.remote_url.as_deref(),
                    args.current_branch.as_deref(),
                    args.scanned_at,
                )
                .await
                .map_err(WriterError::from);
                reply(respond_to, result);
            }
            WriteCommand::InsertCommit { repository_id, commit, respond_to } => {
                let result = conversant_git::insert_commit(&store, repository_id, &commit).await.map_err(WriterError::from);
                reply(respond_to, result);
            }
            WriteCommand::CreateRestorePoint { args, respond_to } => {
                let result = conversant_git::create_restore_point(
                    &store,
                    args.repository_id,
                    &args.commit_hash,
                    &args.label,
                    args.description.as_deref(),
                    args.auto_generated,
                    &args.test_status,
                    args.created_at,
                    args.created_by.as_deref(),
                )
                .await
                .map_err(WriterError::from);
                reply(respond_to, result);
            }
            WriteCommand::LinkConversationToGit { args, respond_to } => {
                let result = conversant_git::link_conversation_to_git(
                    &store,
                    args.conversation_id,
                    args.repository_id,
                    args.commit_id,
                    &args.link_type,
                    args.confidence,
                )
                .await
                .map_err(WriterError::from);
                reply(respond_to, result);
            }
        }
    }
    warn!("writer task shutting down, all handles dropped");
}

fn reply<T>(respond_to: oneshot::Sender<Result<T, WriterError>>, result: Result<T, WriterError>) {
    if respond_to.send(result).is_err() {
        error!("writer caller dropped its response channel before the result arrived");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conversant_core::types::{Message, Role};
    use conversant_git::DiscoveredRepo;
    use std::path::PathBuf;

    fn sample_conversation(session_id: &str) -> ParsedConversation {
        ParsedConversation {
            session_id: session_id.to_string(),
            project_path: "/home/user/project".to_string(),
            project_name: "project".to_string(),
            messages: vec![Message::new(0, Role::User, "hello")],
            created_at: 1,
            updated_at: 2,
            file_references: vec![],
            topics: vec![],
            keywords: vec![],
            skipped_lines: 0,
        }
    }

    #[tokio::test]
    async fn ingest_transcript_round_trips_through_the_queue() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let (writer, _handle) = Writer::spawn(store, 16);

        let outcome = writer.ingest_transcript(sample_conversation("sess-a")).await.unwrap();
        assert!(outcome.is_new);
        assert_eq!(outcome.messages_inserted, 1);
    }

    #[tokio::test]
    async fn serializes_interleaved_transcript_and_git_writes() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let (writer, _handle) = Writer::spawn(store, 16);

        let repo_id = writer
            .upsert_repository(UpsertRepositoryArgs {
                project_path: "/home/user/project".to_string(),
                discovered: DiscoveredRepo {
                    repository_root: PathBuf::from("/home/user/project"),
                    git_directory: PathBuf::from("/home/user/project/.git"),
                    subdirectory_path: None,
                    is_monorepo_subdirectory: false,
                },
                remote_url: None,
                current_branch: Some("main".to_string()),
                scanned_at: 10,
            })
            .await
            .unwrap();

        let ingest = writer.ingest_transcript(sample_conversation("sess-b"));
        let restore_point = writer.create_restore_point(CreateRestorePointArgs {
            repository_id: repo_id,
            commit_hash: "abc123".to_string(),
            label: "checkpoint".to_string(),
            description: None,
            auto_generated: true,
            test_status: "unknown".to_string(),
            created_at: 11,
            created_by: None,
        });

        let (ingest_result, restore_point_result) = tokio::join!(ingest, restore_point);
        assert!(ingest_result.unwrap().is_new);
        assert!(restore_point_result.unwrap() > 0);
    }

    #[tokio::test]
    async fn dropping_all_handles_ends_the_task() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let (writer, handle) = Writer::spawn(store, 4);
        drop(writer);
        handle.await.unwrap();
    }
}
