// crates/git/src/blocking.rs
//! Async wrappers over the adapter's libgit2 calls.
//!
//! `git2` is synchronous; calling it directly from an async fn would block
//! the worker thread it runs on for the duration of the repository walk.
//! Every function here moves its owned arguments onto a `spawn_blocking`
//! task and joins the result back.

use std::path::PathBuf;

use crate::adapter::{
    self, CommitFileChange, CommitHistoryOptions, CommitInfo, DiscoveredRepo, WorkingTreeStatus,
};
use crate::GitError;

pub async fn discover(path: PathBuf) -> Result<DiscoveredRepo, GitError> {
    tokio::task::spawn_blocking(move || adapter::discover(&path)).await?
}

pub async fn current_head(path: PathBuf) -> Result<Option<String>, GitError> {
    tokio::task::spawn_blocking(move || adapter::current_head(&path)).await?
}

pub async fn current_branch(path: PathBuf) -> Result<Option<String>, GitError> {
    tokio::task::spawn_blocking(move || adapter::current_branch(&path)).await?
}

pub async fn remote_url(path: PathBuf) -> Result<Option<String>, GitError> {
    tokio::task::spawn_blocking(move || adapter::remote_url(&path)).await?
}

pub async fn working_directory_status(path: PathBuf) -> Result<WorkingTreeStatus, GitError> {
    tokio::task::spawn_blocking(move || adapter::working_directory_status(&path)).await?
}

pub async fn commit_history(path: PathBuf, options: CommitHistoryOptions) -> Result<Vec<CommitInfo>, GitError> {
    tokio::task::spawn_blocking(move || adapter::commit_history(&path, &options)).await?
}

pub async fn preview_restore(path: PathBuf, commit_hash: String) -> Result<Vec<CommitFileChange>, GitError> {
    tokio::task::spawn_blocking(move || adapter::preview_restore(&path, &commit_hash)).await?
}
