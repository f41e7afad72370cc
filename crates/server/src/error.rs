// crates/server/src/error.rs
//! Tool-facing error envelope: every failure a tool handler can produce maps
//! into one of these kinds before crossing the transport boundary.

use conversant_git::GitError;
use conversant_search::SearchError;
use conversant_store::DbError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition not met: {0}")]
    Precondition(String),

    #[error("corrupt transcript: {0}")]
    Corrupt(String),

    #[error("transient failure, retry: {0}")]
    Transient(String),

    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("unknown tool: {0}")]
    MethodNotFound(String),
}

impl From<SearchError> for ToolError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::UnknownSession(id) => ToolError::NotFound(format!("unknown session: {id}")),
            SearchError::Store(e) => classify_sqlx(e),
        }
    }
}

impl From<DbError> for ToolError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Sqlx(e) => classify_sqlx(e),
            DbError::NoDataDir | DbError::CreateDir(_) => ToolError::Fatal(err.to_string()),
        }
    }
}

impl From<GitError> for ToolError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::Sqlx(e) => classify_sqlx(e),
            GitError::Git2(e) if e.code() == git2::ErrorCode::NotFound => {
                ToolError::Precondition("no git repository found at this path".to_string())
            }
            GitError::Git2(e) => ToolError::Precondition(e.to_string()),
            GitError::InvalidReference(r) => ToolError::InvalidArgument(format!("unknown reference: {r}")),
            GitError::DuplicateRestorePointLabel(label) => {
                ToolError::Conflict(format!("a restore point labeled {label:?} already exists"))
            }
            GitError::TaskJoin(e) => ToolError::Fatal(e.to_string()),
        }
    }
}

impl From<crate::writer::WriterError> for ToolError {
    fn from(err: crate::writer::WriterError) -> Self {
        match err {
            crate::writer::WriterError::Db(e) => e.into(),
            crate::writer::WriterError::Git(e) => e.into(),
            crate::writer::WriterError::Closed => ToolError::Transient("writer task is no longer running".to_string()),
        }
    }
}

fn classify_sqlx(err: sqlx::Error) -> ToolError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.message().contains("locked") || db_err.message().contains("busy") => {
            ToolError::Transient(err.to_string())
        }
        sqlx::Error::PoolTimedOut => ToolError::Transient(err.to_string()),
        _ => ToolError::Fatal(err.to_string()),
    }
}

/// Wire-facing error shape. Messages are free of stack traces and absolute
/// filesystem paths by construction — callers build them from domain facts,
/// never from `Display`ing raw I/O errors.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub kind: &'static str,
    pub message: String,
}

impl From<&ToolError> for ErrorEnvelope {
    fn from(err: &ToolError) -> Self {
        let kind = match err {
            ToolError::InvalidArgument(_) => "invalid_argument",
            ToolError::NotFound(_) => "not_found",
            ToolError::Conflict(_) => "conflict",
            ToolError::Precondition(_) => "precondition",
            ToolError::Corrupt(_) => "corrupt",
            ToolError::Transient(_) => "transient",
            ToolError::Fatal(_) => "fatal",
            ToolError::MethodNotFound(_) => "method_not_found",
        };
        ErrorEnvelope { kind, message: err.to_string() }
    }
}

pub type ToolResult<T> = Result<T, ToolError>;
