// crates/store/src/migrations.rs
//! Inline schema migrations, applied in order and tracked by `_migrations`.
//!
//! Additive-only: a later migration may add columns/tables/indexes but never
//! drops or renames what an earlier one created.

pub const MIGRATIONS: &[&str] = &[
    // 1: conversations + messages + FTS5 mirror + sync triggers
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY,
        session_id TEXT NOT NULL UNIQUE,
        project_path TEXT NOT NULL,
        project_name TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        message_count INTEGER NOT NULL DEFAULT 0,
        total_tokens INTEGER NOT NULL DEFAULT 0,
        file_references TEXT NOT NULL DEFAULT '[]',
        topics TEXT NOT NULL DEFAULT '[]',
        keywords TEXT NOT NULL DEFAULT '[]'
    );
    CREATE INDEX IF NOT EXISTS idx_conversations_project_path ON conversations(project_path);
    CREATE INDEX IF NOT EXISTS idx_conversations_created_at ON conversations(created_at DESC);

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY,
        conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        message_index INTEGER NOT NULL,
        uuid TEXT,
        timestamp TEXT,
        role TEXT NOT NULL,
        content_type TEXT NOT NULL DEFAULT 'text',
        content TEXT NOT NULL,
        content_summary TEXT,
        tool_calls TEXT NOT NULL DEFAULT '[]',
        file_references TEXT NOT NULL DEFAULT '[]',
        tokens INTEGER NOT NULL DEFAULT 0,
        UNIQUE(conversation_id, message_index)
    );
    CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id);

    CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
        content,
        topics,
        project_path UNINDEXED,
        created_at UNINDEXED,
        content='messages',
        content_rowid='id',
        tokenize='porter ascii'
    );

    CREATE TRIGGER IF NOT EXISTS messages_ai AFTER INSERT ON messages BEGIN
        INSERT INTO messages_fts(rowid, content, topics, project_path, created_at)
        SELECT new.id, new.content, c.topics, c.project_path, c.created_at
        FROM conversations c WHERE c.id = new.conversation_id;
    END;
    CREATE TRIGGER IF NOT EXISTS messages_ad AFTER DELETE ON messages BEGIN
        INSERT INTO messages_fts(messages_fts, rowid, content, topics, project_path, created_at)
        VALUES ('delete', old.id, old.content, '', '', 0);
    END;
    CREATE TRIGGER IF NOT EXISTS messages_au AFTER UPDATE ON messages BEGIN
        INSERT INTO messages_fts(messages_fts, rowid, content, topics, project_path, created_at)
        VALUES ('delete', old.id, old.content, '', '', 0);
        INSERT INTO messages_fts(rowid, content, topics, project_path, created_at)
        SELECT new.id, new.content, c.topics, c.project_path, c.created_at
        FROM conversations c WHERE c.id = new.conversation_id;
    END;
    "#,
    // 2: search cache + stats
    r#"
    CREATE TABLE IF NOT EXISTS conversation_search_cache (
        conversation_id INTEGER PRIMARY KEY REFERENCES conversations(id) ON DELETE CASCADE,
        last_snippet TEXT,
        last_score REAL,
        cached_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS index_stats (
        name TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    INSERT OR IGNORE INTO index_stats (name, value) VALUES ('schema_version', '1');
    INSERT OR IGNORE INTO index_stats (name, value) VALUES ('total_conversations', '0');
    INSERT OR IGNORE INTO index_stats (name, value) VALUES ('total_messages', '0');
    INSERT OR IGNORE INTO index_stats (name, value) VALUES ('last_incremental_index', '0');
    "#,
    // 3: git repositories, commits, commit files, restore points, links
    r#"
    CREATE TABLE IF NOT EXISTS git_repositories (
        id INTEGER PRIMARY KEY,
        project_path TEXT NOT NULL UNIQUE,
        working_directory TEXT NOT NULL,
        git_directory TEXT NOT NULL,
        repository_root TEXT,
        subdirectory_path TEXT,
        is_monorepo_subdirectory INTEGER NOT NULL DEFAULT 0,
        remote_url TEXT,
        current_branch TEXT,
        last_scanned INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS git_commits (
        id INTEGER PRIMARY KEY,
        repository_id INTEGER NOT NULL REFERENCES git_repositories(id) ON DELETE CASCADE,
        commit_hash TEXT NOT NULL,
        branch TEXT,
        authored_at INTEGER NOT NULL,
        author_name TEXT NOT NULL,
        author_email TEXT NOT NULL,
        message TEXT NOT NULL,
        parent_hashes TEXT NOT NULL DEFAULT '[]',
        is_merge INTEGER NOT NULL DEFAULT 0,
        insertions INTEGER,
        deletions INTEGER,
        files_changed INTEGER,
        UNIQUE(repository_id, commit_hash)
    );
    CREATE INDEX IF NOT EXISTS idx_git_commits_repo_date ON git_commits(repository_id, authored_at DESC);

    CREATE TABLE IF NOT EXISTS git_commit_files (
        id INTEGER PRIMARY KEY,
        commit_id INTEGER NOT NULL REFERENCES git_commits(id) ON DELETE CASCADE,
        path TEXT NOT NULL,
        change_status TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_git_commit_files_commit_id ON git_commit_files(commit_id);

    CREATE TABLE IF NOT EXISTS restore_points (
        id INTEGER PRIMARY KEY,
        repository_id INTEGER NOT NULL REFERENCES git_repositories(id) ON DELETE CASCADE,
        commit_hash TEXT NOT NULL,
        label TEXT NOT NULL,
        description TEXT,
        auto_generated INTEGER NOT NULL DEFAULT 0,
        test_status TEXT NOT NULL DEFAULT 'unknown',
        created_at INTEGER NOT NULL,
        created_by TEXT,
        UNIQUE(repository_id, label)
    );
    CREATE INDEX IF NOT EXISTS idx_restore_points_repo_created ON restore_points(repository_id, created_at DESC);

    CREATE TABLE IF NOT EXISTS conversation_git_links (
        id INTEGER PRIMARY KEY,
        conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        repository_id INTEGER NOT NULL REFERENCES git_repositories(id) ON DELETE CASCADE,
        commit_id INTEGER REFERENCES git_commits(id) ON DELETE SET NULL,
        link_type TEXT NOT NULL,
        confidence REAL NOT NULL DEFAULT 0,
        time_correlation REAL NOT NULL DEFAULT 0,
        metadata TEXT NOT NULL DEFAULT '{}'
    );
    CREATE INDEX IF NOT EXISTS idx_conv_git_links_conversation ON conversation_git_links(conversation_id);
    CREATE INDEX IF NOT EXISTS idx_conv_git_links_repository ON conversation_git_links(repository_id);
    "#,
    // 4: auto-commit collaborator surfaces — shadow commits, correlations, per-repo settings
    r#"
    CREATE TABLE IF NOT EXISTS shadow_commits (
        id INTEGER PRIMARY KEY,
        commit_hash TEXT NOT NULL UNIQUE,
        shadow_branch TEXT NOT NULL,
        original_branch TEXT NOT NULL,
        repository_path TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        files_changed INTEGER NOT NULL DEFAULT 0,
        insertions INTEGER NOT NULL DEFAULT 0,
        deletions INTEGER NOT NULL DEFAULT 0,
        message TEXT NOT NULL,
        conversation_session_id TEXT,
        correlation_confidence REAL
    );
    CREATE INDEX IF NOT EXISTS idx_shadow_commits_repo_time ON shadow_commits(repository_path, timestamp DESC);

    CREATE TABLE IF NOT EXISTS conversation_git_correlations (
        id INTEGER PRIMARY KEY,
        conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        shadow_commit_id INTEGER REFERENCES shadow_commits(id) ON DELETE CASCADE,
        file_path TEXT NOT NULL,
        confidence REAL NOT NULL,
        correlated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_correlations_conversation ON conversation_git_correlations(conversation_id);

    CREATE TABLE IF NOT EXISTS repository_settings (
        repository_id INTEGER PRIMARY KEY REFERENCES git_repositories(id) ON DELETE CASCADE,
        auto_commit_enabled INTEGER NOT NULL DEFAULT 0,
        notify_on_commit INTEGER NOT NULL DEFAULT 1,
        excluded_globs TEXT NOT NULL DEFAULT '[]',
        throttle_seconds INTEGER NOT NULL DEFAULT 30,
        max_file_size_bytes INTEGER NOT NULL DEFAULT 5242880,
        shadow_branch_prefix TEXT NOT NULL DEFAULT 'shadow/',
        commit_count INTEGER NOT NULL DEFAULT 0
    );
    "#,
    // 5: natural key for conversation_git_links so link_conversation_to_git
    // can upsert via INSERT OR REPLACE instead of accumulating duplicates.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_conv_git_links_natural_key
        ON conversation_git_links(conversation_id, repository_id, link_type);
    "#,
];
