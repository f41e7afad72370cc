// crates/git/src/lib.rs
//! Read-only git access (C6), durable commit/restore-point indexing (C7),
//! and file-to-conversation correlation (C8).

pub mod adapter;
pub mod blocking;
pub mod correlator;
pub mod indexer;

pub use adapter::{
    commit_history, current_branch, current_head, discover, preview_restore, remote_url,
    working_directory_status, CommitFileChange, CommitHistoryOptions, CommitInfo, DiscoveredRepo,
    WorkingTreeStatus,
};
pub use correlator::{CorrelationResult, Correlator};
pub use indexer::{
    create_restore_point, get_repository, get_restore_point, insert_commit,
    link_conversation_to_git, list_restore_points, upsert_repository, RepositoryRecord,
    RestorePoint, RestorePointFilters,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),

    #[error("store error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("unknown branch or reference: {0}")]
    InvalidReference(String),

    #[error("a restore point labeled {0:?} already exists for this repository")]
    DuplicateRestorePointLabel(String),

    #[error("git operation panicked: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type GitResult<T> = Result<T, GitError>;
