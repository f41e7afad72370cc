// crates/core/src/paths.rs
//! Centralized path functions for on-disk storage locations.
//!
//! Single source of truth — avoids ad-hoc `dirs::home_dir().join(...)` calls
//! scattered across crates.

use std::path::PathBuf;

/// Transcript root: `~/.claude/projects/`. One subdirectory per project.
pub fn transcript_root() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join(".claude").join("projects"))
}

/// Storage root for indexer state: `~/.claude/ai-memory/`.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join(".claude").join("ai-memory"))
}

/// SQLite database file: `<app_data_dir>/conversations.db`.
pub fn db_path() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join("conversations.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_root_points_at_claude_projects() {
        let dir = transcript_root().unwrap();
        assert!(dir.ends_with(".claude/projects") || dir.ends_with(".claude\\projects"));
    }

    #[test]
    fn app_data_dir_points_at_ai_memory() {
        let dir = app_data_dir().unwrap();
        assert!(dir.ends_with(".claude/ai-memory") || dir.ends_with(".claude\\ai-memory"));
    }

    #[test]
    fn db_path_ends_with_conversations_db() {
        let path = db_path().unwrap();
        assert!(path.ends_with("conversations.db"));
    }
}
