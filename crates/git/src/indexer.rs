// crates/git/src/indexer.rs
//! Git Indexer & Restore-Point Store (C7): persists what the adapter
//! discovers, keyed so re-scans are idempotent upserts rather than
//! accumulating duplicates.

use conversant_store::Store;
use sqlx::Row;

use crate::adapter::{CommitInfo, DiscoveredRepo};
use crate::GitError;

#[derive(Debug, Clone)]
pub struct RestorePoint {
    pub id: i64,
    pub repository_id: i64,
    pub commit_hash: String,
    pub label: String,
    pub description: Option<String>,
    pub auto_generated: bool,
    pub test_status: String,
    pub created_at: i64,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RestorePointFilters {
    pub include_auto_generated: bool,
    /// Lower bound on `created_at`, already resolved from a timeframe expression.
    pub created_after: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RepositoryRecord {
    pub id: i64,
    pub project_path: String,
    pub working_directory: String,
    pub remote_url: Option<String>,
    pub current_branch: Option<String>,
    pub last_scanned: i64,
}

/// Looks up a previously discovered repository by its project path, without
/// touching the working tree.
pub async fn get_repository(store: &Store, project_path: &str) -> Result<Option<RepositoryRecord>, GitError> {
    let row = sqlx::query(
        "SELECT id, project_path, working_directory, remote_url, current_branch, last_scanned
         FROM git_repositories WHERE project_path = ?",
    )
    .bind(project_path)
    .fetch_optional(store.pool())
    .await?;

    Ok(row.map(|row| RepositoryRecord {
        id: row.get("id"),
        project_path: row.get("project_path"),
        working_directory: row.get("working_directory"),
        remote_url: row.get("remote_url"),
        current_branch: row.get("current_branch"),
        last_scanned: row.get("last_scanned"),
    }))
}

/// ON CONFLICT(project_path) updates discovered fields. Booleans as 0/1.
pub async fn upsert_repository(
    store: &Store,
    project_path: &str,
    discovered: &DiscoveredRepo,
    remote_url: Option<&str>,
    current_branch: Option<&str>,
    scanned_at: i64,
) -> Result<i64, GitError> {
    let working_directory = discovered.repository_root.to_string_lossy();
    let git_directory = discovered.git_directory.to_string_lossy();
    let subdirectory = discovered.subdirectory_path.as_ref().map(|p| p.to_string_lossy().to_string());

    sqlx::query(
        "INSERT INTO git_repositories
            (project_path, working_directory, git_directory, repository_root,
             subdirectory_path, is_monorepo_subdirectory, remote_url, current_branch, last_scanned)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(project_path) DO UPDATE SET
            working_directory = excluded.working_directory,
            git_directory = excluded.git_directory,
            repository_root = excluded.repository_root,
            subdirectory_path = excluded.subdirectory_path,
            is_monorepo_subdirectory = excluded.is_monorepo_subdirectory,
            remote_url = excluded.remote_url,
            current_branch = excluded.current_branch,
            last_scanned = excluded.last_scanned",
    )
    .bind(project_path)
    .bind(working_directory.as_ref())
    .bind(git_directory.as_ref())
    .bind(working_directory.as_ref())
    .bind(&subdirectory)
    .bind(discovered.is_monorepo_subdirectory as i64)
    .bind(remote_url)
    .bind(current_branch)
    .bind(scanned_at)
    .execute(store.pool())
    .await?;

    let row = sqlx::query("SELECT id FROM git_repositories WHERE project_path = ?")
        .bind(project_path)
        .fetch_one(store.pool())
        .await?;
    Ok(row.get("id"))
}

/// ON CONFLICT(repository_id, commit_hash) updates metadata; commit files are
/// inserted only the first time a commit is seen.
pub async fn insert_commit(store: &Store, repository_id: i64, commit: &CommitInfo) -> Result<i64, GitError> {
    let existed: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM git_commits WHERE repository_id = ? AND commit_hash = ?",
    )
    .bind(repository_id)
    .bind(&commit.hash)
    .fetch_optional(store.pool())
    .await?;

    let parent_hashes = serde_json::to_string(&commit.parent_hashes).unwrap();

    sqlx::query(
        "INSERT INTO git_commits
            (repository_id, commit_hash, branch, authored_at, author_name, author_email,
             message, parent_hashes, is_merge, insertions, deletions, files_changed)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(repository_id, commit_hash) DO UPDATE SET
            branch = excluded.branch,
            message = excluded.message,
            insertions = excluded.insertions,
            deletions = excluded.deletions,
            files_changed = excluded.files_changed",
    )
    .bind(repository_id)
    .bind(&commit.hash)
    .bind(&commit.branch)
    .bind(commit.authored_at)
    .bind(&commit.author_name)
    .bind(&commit.author_email)
    .bind(&commit.message)
    .bind(&parent_hashes)
    .bind(commit.is_merge as i64)
    .bind(commit.insertions)
    .bind(commit.deletions)
    .bind(commit.files_changed)
    .execute(store.pool())
    .await?;

    let row = sqlx::query("SELECT id FROM git_commits WHERE repository_id = ? AND commit_hash = ?")
        .bind(repository_id)
        .bind(&commit.hash)
        .fetch_one(store.pool())
        .await?;
    let commit_id: i64 = row.get("id");

    if existed.is_none() {
        for file in &commit.files {
            sqlx::query("INSERT INTO git_commit_files (commit_id, path, change_status) VALUES (?, ?, ?)")
                .bind(commit_id)
                .bind(&file.path)
                .bind(&file.change_status)
                .execute(store.pool())
                .await?;
        }
    }

    Ok(commit_id)
}

/// Rejects a duplicate label within the same repository.
pub async fn create_restore_point(
    store: &Store,
    repository_id: i64,
    commit_hash: &str,
    label: &str,
    description: Option<&str>,
    auto_generated: bool,
    test_status: &str,
    created_at: i64,
    created_by: Option<&str>,
) -> Result<i64, GitError> {
    let existing: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM restore_points WHERE repository_id = ? AND label = ?",
    )
    .bind(repository_id)
    .bind(label)
    .fetch_optional(store.pool())
    .await?;

    if existing.is_some() {
        return Err(GitError::DuplicateRestorePointLabel(label.to_string()));
    }

    let result = sqlx::query(
        "INSERT INTO restore_points
            (repository_id, commit_hash, label, description, auto_generated, test_status, created_at, created_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(repository_id)
    .bind(commit_hash)
    .bind(label)
    .bind(description)
    .bind(auto_generated as i64)
    .bind(test_status)
    .bind(created_at)
    .bind(created_by)
    .execute(store.pool())
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_restore_point(store: &Store, restore_point_id: i64) -> Result<Option<RestorePoint>, GitError> {
    let row = sqlx::query(
        "SELECT id, repository_id, commit_hash, label, description, auto_generated,
                test_status, created_at, created_by
         FROM restore_points WHERE id = ?",
    )
    .bind(restore_point_id)
    .fetch_optional(store.pool())
    .await?;

    Ok(row.map(|row| RestorePoint {
        id: row.get("id"),
        repository_id: row.get("repository_id"),
        commit_hash: row.get("commit_hash"),
        label: row.get("label"),
        description: row.get("description"),
        auto_generated: row.get::<i64, _>("auto_generated") != 0,
        test_status: row.get("test_status"),
        created_at: row.get("created_at"),
        created_by: row.get("created_by"),
    }))
}

pub async fn list_restore_points(
    store: &Store,
    repository_id: i64,
    filters: &RestorePointFilters,
) -> Result<Vec<RestorePoint>, GitError> {
    let rows = sqlx::query(
        "SELECT id, repository_id, commit_hash, label, description, auto_generated,
                test_status, created_at, created_by
         FROM restore_points
         WHERE repository_id = ?
           AND (?2 = 1 OR auto_generated = 0)
           AND (?3 IS NULL OR created_at >= ?3)
         ORDER BY created_at DESC",
    )
    .bind(repository_id)
    .bind(filters.include_auto_generated as i64)
    .bind(filters.created_after)
    .fetch_all(store.pool())
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| RestorePoint {
            id: row.get("id"),
            repository_id: row.get("repository_id"),
            commit_hash: row.get("commit_hash"),
            label: row.get("label"),
            description: row.get("description"),
            auto_generated: row.get::<i64, _>("auto_generated") != 0,
            test_status: row.get("test_status"),
            created_at: row.get("created_at"),
            created_by: row.get("created_by"),
        })
        .collect())
}

/// `INSERT OR REPLACE` on the natural key `(conversation_id, repository_id, link_type)`.
pub async fn link_conversation_to_git(
    store: &Store,
    conversation_id: i64,
    repository_id: i64,
    commit_id: Option<i64>,
    link_type: &str,
    confidence: f64,
) -> Result<(), GitError> {
    sqlx::query(
        "INSERT OR REPLACE INTO conversation_git_links
            (conversation_id, repository_id, commit_id, link_type, confidence, time_correlation, metadata)
         VALUES (?, ?, ?, ?, ?, 0, '{}')",
    )
    .bind(conversation_id)
    .bind(repository_id)
    .bind(commit_id)
    .bind(link_type)
    .bind(confidence)
    .execute(store.pool())
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DiscoveredRepo;
    use std::path::PathBuf;

    fn sample_repo() -> DiscoveredRepo {
        DiscoveredRepo {
            repository_root: PathBuf::from("/repo"),
            git_directory: PathBuf::from("/repo/.git"),
            subdirectory_path: None,
            is_monorepo_subdirectory: false,
        }
    }

    fn sample_commit(hash: &str) -> CommitInfo {
        CommitInfo {
            hash: hash.to_string(),
            branch: Some("main".to_string()),
            authored_at: 1000,
            author_name: "dev".to_string(),
            author_email: "dev@example.com".to_string(),
            message: "msg".to_string(),
            parent_hashes: vec![],
            is_merge: false,
            insertions: Some(1),
            deletions: Some(0),
            files_changed: Some(1),
            files: vec![crate::adapter::CommitFileChange {
                path: "a.txt".to_string(),
                change_status: "added".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn upsert_repository_is_idempotent_by_project_path() {
        let store = Store::open_in_memory().await.unwrap();
        let repo = sample_repo();
        let id1 = upsert_repository(&store, "/home/user/project", &repo, None, Some("main"), 1).await.unwrap();
        let id2 = upsert_repository(&store, "/home/user/project", &repo, None, Some("develop"), 2).await.unwrap();
        assert_eq!(id1, id2);

        let row = sqlx::query("SELECT current_branch FROM git_repositories WHERE id = ?")
            .bind(id1)
            .fetch_one(store.pool())
            .await
            .unwrap();
        let branch: String = row.get("current_branch");
        assert_eq!(branch, "develop");
    }

    #[tokio::test]
    async fn insert_commit_files_only_inserted_once() {
        let store = Store::open_in_memory().await.unwrap();
        let repo = sample_repo();
        let repo_id = upsert_repository(&store, "/p", &repo, None, None, 1).await.unwrap();
        let commit = sample_commit("abc123");

        insert_commit(&store, repo_id, &commit).await.unwrap();
        insert_commit(&store, repo_id, &commit).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM git_commit_files")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn create_restore_point_rejects_duplicate_label() {
        let store = Store::open_in_memory().await.unwrap();
        let repo = sample_repo();
        let repo_id = upsert_repository(&store, "/p", &repo, None, None, 1).await.unwrap();

        create_restore_point(&store, repo_id, "abc", "before-refactor", None, false, "unknown", 1, None)
            .await
            .unwrap();
        let result = create_restore_point(&store, repo_id, "def", "before-refactor", None, false, "unknown", 2, None).await;
        assert!(matches!(result, Err(GitError::DuplicateRestorePointLabel(_))));
    }

    #[tokio::test]
    async fn get_restore_point_returns_by_id() {
        let store = Store::open_in_memory().await.unwrap();
        let repo = sample_repo();
        let repo_id = upsert_repository(&store, "/p", &repo, None, None, 1).await.unwrap();
        let id = create_restore_point(&store, repo_id, "abc", "checkpoint", None, false, "unknown", 1, None)
            .await
            .unwrap();

        let point = get_restore_point(&store, id).await.unwrap().unwrap();
        assert_eq!(point.label, "checkpoint");
        assert_eq!(point.commit_hash, "abc");
        assert!(get_restore_point(&store, id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn link_conversation_to_git_upserts_on_natural_key() {
        let store = Store::open_in_memory().await.unwrap();
        let repo = sample_repo();
        let repo_id = upsert_repository(&store, "/p", &repo, None, None, 1).await.unwrap();

        sqlx::query(
            "INSERT INTO conversations (session_id, project_path, project_name, created_at, updated_at)
             VALUES ('s1', '/p', 'p', 1, 1)",
        )
        .execute(store.pool())
        .await
        .unwrap();

        link_conversation_to_git(&store, 1, repo_id, None, "referenced", 0.5).await.unwrap();
        link_conversation_to_git(&store, 1, repo_id, None, "referenced", 0.9).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversation_git_links")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
