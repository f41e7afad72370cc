// crates/git/src/adapter.rs
//! Read-only working-tree access via `git2`. The core never shells out to a
//! `git` binary — every call here is a libgit2 binding.

use std::path::{Path, PathBuf};

use crate::GitError;

/// Result of locating the repository that owns a filesystem path.
#[derive(Debug, Clone)]
pub struct DiscoveredRepo {
    pub repository_root: PathBuf,
    pub git_directory: PathBuf,
    /// Set when `path` is nested below the repository root.
    pub subdirectory_path: Option<PathBuf>,
    pub is_monorepo_subdirectory: bool,
}

/// Walk upwards from `path` to find the nearest repository.
pub fn discover(path: &Path) -> Result<DiscoveredRepo, GitError> {
    let repo = git2::Repository::discover(path)?;
    let repository_root = repo
        .workdir()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| repo.path().to_path_buf());
    let git_directory = repo.path().to_path_buf();

    let canonical_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let canonical_root = repository_root.canonicalize().unwrap_or_else(|_| repository_root.clone());

    let subdirectory_path = canonical_path
        .strip_prefix(&canonical_root)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(|rel| rel.to_path_buf());

    Ok(DiscoveredRepo {
        is_monorepo_subdirectory: subdirectory_path.is_some(),
        repository_root,
        git_directory,
        subdirectory_path,
    })
}

pub fn current_head(path: &Path) -> Result<Option<String>, GitError> {
    let repo = git2::Repository::discover(path)?;
    let result = match repo.head() {
        Ok(head) => Ok(head.peel_to_commit()?.id().to_string().into()),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
        Err(e) => Err(e.into()),
    };
    result
}

pub fn current_branch(path: &Path) -> Result<Option<String>, GitError> {
    let repo = git2::Repository::discover(path)?;
    let result = match repo.head() {
        Ok(head) => Ok(head.shorthand().map(str::to_string)),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
        Err(e) => Err(e.into()),
    };
    result
}

pub fn remote_url(path: &Path) -> Result<Option<String>, GitError> {
    let repo = git2::Repository::discover(path)?;
    let result = match repo.find_remote("origin") {
        Ok(remote) => Ok(remote.url().map(str::to_string)),
        Err(_) => Ok(None),
    };
    result
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkingTreeStatus {
    pub modified: usize,
    pub untracked: usize,
}

impl WorkingTreeStatus {
    pub fn is_clean(&self) -> bool {
        self.modified == 0 && self.untracked == 0
    }
}

pub fn working_directory_status(path: &Path) -> Result<WorkingTreeStatus, GitError> {
    let repo = git2::Repository::discover(path)?;
    let statuses = repo.statuses(None)?;

    let mut status = WorkingTreeStatus::default();
    for entry in statuses.iter() {
        let flags = entry.status();
        if flags.intersects(git2::Status::WT_NEW | git2::Status::INDEX_NEW) {
            status.untracked += 1;
        } else if !flags.is_empty() {
            status.modified += 1;
        }
    }
    Ok(status)
}

#[derive(Debug, Clone)]
pub struct CommitFileChange {
    pub path: String,
    pub change_status: String,
}

#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub hash: String,
    pub branch: Option<String>,
    pub authored_at: i64,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    pub parent_hashes: Vec<String>,
    pub is_merge: bool,
    pub insertions: Option<i64>,
    pub deletions: Option<i64>,
    pub files_changed: Option<i64>,
    pub files: Vec<CommitFileChange>,
}

#[derive(Debug, Clone, Default)]
pub struct CommitHistoryOptions {
    pub limit: usize,
    pub branch: Option<String>,
}

/// Enumerate commit history reachable from `branch` (or HEAD), most recent first.
pub fn commit_history(path: &Path, options: &CommitHistoryOptions) -> Result<Vec<CommitInfo>, GitError> {
    let repo = git2::Repository::discover(path)?;
    let current_branch_name = current_branch(path)?;

    let mut revwalk = repo.revwalk()?;
    match &options.branch {
        Some(branch) => {
            let reference = repo.find_branch(branch, git2::BranchType::Local)?;
            let oid = reference
                .get()
                .target()
                .ok_or_else(|| GitError::InvalidReference(branch.clone()))?;
            revwalk.push(oid)?;
        }
        None => {
            revwalk.push_head()?;
        }
    }
    revwalk.set_sorting(git2::Sort::TIME)?;

    let limit = if options.limit == 0 { usize::MAX } else { options.limit };
    let mut commits = Vec::new();

    for oid in revwalk.take(limit) {
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        let tree = commit.tree()?;

        let parent_hashes: Vec<String> = (0..commit.parent_count())
            .filter_map(|i| commit.parent_id(i).ok())
            .map(|id| id.to_string())
            .collect();

        let diff = if commit.parent_count() > 0 {
            let parent_tree = commit.parent(0)?.tree()?;
            repo.diff_tree_to_tree(Some(&parent_tree), Some(&tree), None)?
        } else {
            repo.diff_tree_to_tree(None, Some(&tree), None)?
        };

        let stats = diff.stats()?;
        let mut files = Vec::new();
        diff.foreach(
            &mut |delta, _| {
                if let Some(p) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                    files.push(CommitFileChange {
                        path: p.to_string_lossy().to_string(),
                        change_status: delta_status_str(delta.status()).to_string(),
                    });
                }
                true
            },
            None,
            None,
            None,
        )?;

        let author = commit.author();
        commits.push(CommitInfo {
            hash: oid.to_string(),
            branch: current_branch_name.clone(),
            authored_at: commit.time().seconds(),
            author_name: author.name().unwrap_or("unknown").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            message: commit.message().unwrap_or("").trim_end().to_string(),
            is_merge: commit.parent_count() > 1,
            insertions: Some(stats.insertions() as i64),
            deletions: Some(stats.deletions() as i64),
            files_changed: Some(stats.files_changed() as i64),
            files,
            parent_hashes,
        });
    }

    Ok(commits)
}

/// Dry-run diff of what restoring `commit_hash` would change relative to the
/// current `HEAD`. Read-only: never touches the working tree or index.
pub fn preview_restore(path: &Path, commit_hash: &str) -> Result<Vec<CommitFileChange>, GitError> {
    let repo = git2::Repository::discover(path)?;
    let target_oid = git2::Oid::from_str(commit_hash)?;
    let target_commit = repo.find_commit(target_oid)?;
    let target_tree = target_commit.tree()?;

    let head = repo.head()?;
    let head_tree = head.peel_to_commit()?.tree()?;

    let diff = repo.diff_tree_to_tree(Some(&head_tree), Some(&target_tree), None)?;
    let mut files = Vec::new();
    diff.foreach(
        &mut |delta, _| {
            if let Some(p) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                files.push(CommitFileChange {
                    path: p.to_string_lossy().to_string(),
                    change_status: delta_status_str(delta.status()).to_string(),
                });
            }
            true
        },
        None,
        None,
        None,
    )?;

    Ok(files)
}

fn delta_status_str(status: git2::Delta) -> &'static str {
    match status {
        git2::Delta::Added => "added",
        git2::Delta::Deleted => "deleted",
        git2::Delta::Modified => "modified",
        git2::Delta::Renamed => "renamed",
        git2::Delta::Copied => "copied",
        git2::Delta::Typechange => "typechange",
        _ => "unknown",
    }
}
