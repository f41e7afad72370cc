// crates/core/src/discovery.rs
//! Project path resolution for the transcript root.
//!
//! `~/.claude/projects/<encoded-name>/` holds one directory per project, with
//! the project's real filesystem path encoded into the directory name
//! (slashes become hyphens). This module decodes that encoding back into a
//! real path and a human display name, which the Parser attaches to every
//! Conversation it produces.

use crate::error::DiscoveryError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Returns the path to the transcript root (`~/.claude/projects`).
///
/// # Errors
/// Returns `DiscoveryError::HomeDirNotFound` if the home directory cannot be determined.
pub fn claude_projects_dir() -> Result<PathBuf, DiscoveryError> {
    let home = dirs::home_dir().ok_or(DiscoveryError::HomeDirNotFound)?;
    Ok(home.join(".claude").join("projects"))
}

/// Resolved project path information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProject {
    /// The full filesystem path (e.g., "/Users/foo/my-project")
    pub full_path: String,
    /// Human-readable display name (e.g., "my-project")
    pub display_name: String,
}

/// Resolve an encoded project directory name to a filesystem path.
///
/// Claude encodes paths like `/Users/foo/my-project` as `-Users-foo-my-project`.
/// The challenge is that hyphens in real directory names look like path separators,
/// and `--` is ambiguous (both `@` and `.` prefixed dirs encode to `--`).
///
/// Strategy: DFS with directory listing (like ls/zsh resolution).
/// 1. Tokenize the encoded name (handling `--` as prefix marker)
/// 2. At each directory level, `read_dir` to get actual entries
/// 3. Match consecutive segments (joined with `-`) against real entries
/// 4. For `--`-marked segments, try `@`, `.`, and bare prefixes
/// 5. Backtrack if a path leads to a dead end
/// 6. Derive display name from nearest git root
pub fn resolve_project_path(encoded_name: &str) -> ResolvedProject {
    if encoded_name.is_empty() {
        return ResolvedProject {
            full_path: String::new(),
            display_name: String::new(),
        };
    }

    let segments = tokenize_encoded_name(encoded_name);

    if segments.is_empty() {
        return ResolvedProject {
            full_path: "/".to_string(),
            display_name: "/".to_string(),
        };
    }

    let resolved_path = if let Some(path) = dfs_resolve(&PathBuf::from("/"), &segments, 0) {
        path.to_string_lossy().to_string()
    } else {
        // Fallback: join all segments with / (all-separators interpretation)
        format!("/{}", segments.join("/"))
    };

    let display_name = derive_display_name(&resolved_path);

    ResolvedProject {
        full_path: resolved_path,
        display_name,
    }
}

/// If the encoded project name represents a git worktree, return the parent
/// project's encoded name. Otherwise return None.
///
/// Worktree paths: `-Users-dev-project--worktrees-branch-name`
/// Parent:         `-Users-dev-project`
pub fn resolve_worktree_parent(encoded_name: &str) -> Option<String> {
    let marker = "--worktrees-";
    let pos = encoded_name.find(marker)?;
    if pos == 0 {
        return None;
    }
    Some(encoded_name[..pos].to_string())
}

/// Tokenize an encoded project name into path segments.
///
/// Handles `--` → `/@` conversion for scoped packages.
///
/// Example: `-Users-user-dev--example-org-claude-view`
///   → `["Users", "user", "dev", "@example", "org", "claude", "view"]`
fn tokenize_encoded_name(encoded_name: &str) -> Vec<String> {
    let name = encoded_name.strip_prefix('-').unwrap_or(encoded_name);
    if name.is_empty() {
        return vec![];
    }

    let normalized = name.replace("--", "\x00/\x00@");

    let mut segments = Vec::new();
    for part in normalized.split('-') {
        for sub in part.split("\x00/") {
            let restored = sub.replace('\x00', "");
            if !restored.is_empty() {
                segments.push(restored);
            }
        }
    }

    segments
}

/// DFS filesystem walk to resolve path segments against actual directory entries.
///
/// At each directory level:
/// 1. Read all entries via `read_dir` into a `HashSet` for O(1) lookup
/// 2. Try matching 1..N consecutive segments joined with `-` against entries
/// 3. For segments from `--` encoding (marked with `@` by the tokenizer), also
///    try `@`-prefixed and `.`-prefixed variants to handle both scoped packages
///    and hidden directories
/// 4. For 2-segment groups, also try `.` join for domain names (e.g., `acme.io`)
/// 5. Recurse into matching directories; backtrack on dead ends
fn dfs_resolve(base: &Path, segments: &[String], start: usize) -> Option<PathBuf> {
    if start >= segments.len() {
        return if base.exists() { Some(base.to_path_buf()) } else { None };
    }

    let entries: HashSet<String> = match std::fs::read_dir(base) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .collect(),
        Err(_) => return None,
    };

    let remaining = segments.len() - start;

    for join_count in 1..=remaining {
        let candidates = build_candidates(segments, start, join_count);
        let next_start = start + join_count;

        for candidate in &candidates {
            if candidate.is_empty() || !entries.contains(candidate.as_str()) {
                continue;
            }

            let next_path = base.join(candidate);

            if next_start >= segments.len() {
                return Some(next_path);
            }

            if next_path.is_dir() {
                if let Some(result) = dfs_resolve(&next_path, segments, next_start) {
                    return Some(result);
                }
            }
        }
    }

    None
}

/// Build candidate directory names for a given slice of segments.
fn build_candidates(segments: &[String], start: usize, join_count: usize) -> Vec<String> {
    let first = &segments[start];
    let has_prefix_marker = first.starts_with('@');

    let mut parts: Vec<&str> = Vec::with_capacity(join_count);
    for i in 0..join_count {
        let seg = &segments[start + i];
        parts.push(seg.strip_prefix('@').unwrap_or(seg.as_str()));
    }

    let joined = parts.join("-");

    let mut candidates = Vec::with_capacity(4);

    if has_prefix_marker {
        candidates.push(format!("@{}", joined));
        candidates.push(format!(".{}", joined));
    }
    candidates.push(joined.clone());

    if join_count == 2 {
        candidates.push(format!("{}.{}", parts[0], parts[1]));
    }

    candidates
}

/// Derive a human-friendly display name from a resolved filesystem path.
///
/// Walks up to 5 levels looking for the topmost `.git` directory (handling
/// worktrees/nested repos) and uses the git root name plus relative suffix;
/// falls back to the last path component when no git root is found.
fn derive_display_name(resolved_path: &str) -> String {
    let path = Path::new(resolved_path);

    let mut topmost_git_root: Option<&Path> = None;
    let mut current = path;

    for _ in 0..5 {
        if current.join(".git").exists() {
            topmost_git_root = Some(current);
        }

        match current.parent() {
            Some(parent) if parent != current => current = parent,
            _ => break,
        }
    }

    if let Some(git_root) = topmost_git_root {
        let git_root_name = git_root
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        if git_root == path {
            return git_root_name;
        }

        if let Ok(relative) = path.strip_prefix(git_root) {
            return format!("{}/{}", git_root_name, relative.display());
        }

        return git_root_name;
    }

    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| resolved_path.to_string())
}

/// Truncate a string to a maximum length, breaking at a word boundary when
/// possible. Handles multi-byte UTF-8 safely.
pub fn truncate_preview(text: &str, max_len: usize) -> String {
    let trimmed = text.trim();

    let char_count = trimmed.chars().count();
    if char_count <= max_len {
        return trimmed.to_string();
    }

    let truncated: String = trimmed.chars().take(max_len).collect();

    if let Some(last_space_byte_idx) = truncated.rfind(' ') {
        let char_idx_at_space = truncated[..last_space_byte_idx].chars().count();
        if char_idx_at_space > max_len / 2 {
            let up_to_space: String = truncated.chars().take(char_idx_at_space).collect();
            return format!("{}...", up_to_space.trim_end());
        }
    }

    format!("{}...", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn claude_projects_dir_ends_with_expected_suffix() {
        let path = claude_projects_dir().unwrap();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with(".claude/projects") || path_str.ends_with(".claude\\projects"));
    }

    #[test]
    fn resolve_simple_path_falls_back_when_not_found() {
        let resolved = resolve_project_path("-tmp");
        assert_eq!(resolved.full_path, "/tmp");
        assert_eq!(resolved.display_name, "tmp");
    }

    #[test]
    fn resolve_empty_path() {
        let resolved = resolve_project_path("");
        assert_eq!(resolved.full_path, "");
        assert_eq!(resolved.display_name, "");
    }

    #[test]
    fn tokenize_simple() {
        let segments = tokenize_encoded_name("-Users-foo-bar");
        assert_eq!(segments, vec!["Users", "foo", "bar"]);
    }

    #[test]
    fn tokenize_double_dash_at_prefix() {
        let segments = tokenize_encoded_name("-Users-dev--example-org-project");
        assert_eq!(segments, vec!["Users", "dev", "@example", "org", "project"]);
    }

    #[test]
    fn tokenize_empty() {
        assert!(tokenize_encoded_name("").is_empty());
        assert!(tokenize_encoded_name("-").is_empty());
    }

    #[test]
    fn dfs_resolve_hyphenated_project_name() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        std::fs::create_dir_all(base.join("dev/my-cool-project")).unwrap();

        let segments: Vec<String> = vec!["dev", "my", "cool", "project"]
            .into_iter()
            .map(String::from)
            .collect();

        let result = dfs_resolve(base, &segments, 0);
        assert!(result.unwrap().ends_with("dev/my-cool-project"));
    }

    #[test]
    fn dfs_resolve_dot_prefixed_directory() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        std::fs::create_dir_all(base.join("project/.worktrees/main-audit")).unwrap();

        let segments: Vec<String> = vec!["project", "@worktrees", "main", "audit"]
            .into_iter()
            .map(String::from)
            .collect();

        let result = dfs_resolve(base, &segments, 0);
        assert!(result.unwrap().ends_with("project/.worktrees/main-audit"));
    }

    #[test]
    fn dfs_resolve_backtracking() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        std::fs::create_dir_all(base.join("a")).unwrap();
        std::fs::create_dir_all(base.join("a-b/c")).unwrap();

        let segments: Vec<String> = vec!["a", "b", "c"].into_iter().map(String::from).collect();

        let result = dfs_resolve(base, &segments, 0);
        assert!(result.unwrap().ends_with("a-b/c"));
    }

    #[test]
    fn dfs_resolve_nonexistent() {
        let temp = TempDir::new().unwrap();
        let segments: Vec<String> = vec!["no", "such", "path"]
            .into_iter()
            .map(String::from)
            .collect();

        assert!(dfs_resolve(temp.path(), &segments, 0).is_none());
    }

    #[test]
    fn display_name_uses_topmost_git_root() {
        let temp = TempDir::new().unwrap();
        let deep = temp.path().join("a/b/c/d/e/f");
        let parent = deep.join("parent");
        std::fs::create_dir_all(parent.join(".git")).unwrap();
        let child = parent.join("child");
        std::fs::create_dir_all(child.join(".git")).unwrap();

        assert_eq!(derive_display_name(&child.to_string_lossy()), "parent/child");
    }

    #[test]
    fn display_name_falls_back_without_git_root() {
        let temp = TempDir::new().unwrap();
        let deep = temp.path().join("a/b/c/d/e/f/some-dir");
        std::fs::create_dir_all(&deep).unwrap();

        assert_eq!(derive_display_name(&deep.to_string_lossy()), "some-dir");
    }

    #[test]
    fn worktree_parent_basic() {
        assert_eq!(
            resolve_worktree_parent("-Users-dev-project--worktrees-feature-branch"),
            Some("-Users-dev-project".to_string())
        );
    }

    #[test]
    fn non_worktree_returns_none() {
        assert_eq!(resolve_worktree_parent("-Users-dev-project"), None);
    }

    #[test]
    fn truncate_preview_short_string_unchanged() {
        assert_eq!(truncate_preview("Hello world", 50), "Hello world");
    }

    #[test]
    fn truncate_preview_breaks_at_word_boundary() {
        let text = "Hello world this is a test";
        let result = truncate_preview(text, 15);
        assert!(result.ends_with("..."));
        assert!(result.len() <= 18);
    }
}
