// crates/watcher/src/lib.rs
//! Directory Watcher (C3): one background subscription over the transcript
//! root, debounced per path, feeding `FileChanged` events to the Indexer.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("home directory could not be determined")]
    NoHomeDir,
}

pub type WatcherResult<T> = Result<T, WatcherError>;

/// A debounced, filtered filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Changed(PathBuf),
    Removed(PathBuf),
}

struct DebounceState {
    timers: Mutex<HashMap<PathBuf, JoinHandle<()>>>,
    in_flight: Mutex<HashSet<PathBuf>>,
}

/// Owns the OS subscription and per-path debounce timers for one root.
pub struct DirectoryWatcher {
    _inner: RecommendedWatcher,
    state: Arc<DebounceState>,
}

impl DirectoryWatcher {
    /// Subscribe to `root` (recursively) and begin delivering debounced
    /// `.jsonl` change events on `tx`. Performs no initial scan — call
    /// [`initial_scan`] separately and enqueue its results up front.
    pub fn start(root: &Path, tx: mpsc::Sender<FileEvent>, debounce: Duration) -> WatcherResult<Self> {
        let state = Arc::new(DebounceState {
            timers: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        });

        let watch_state = state.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "watcher subscription error");
                    return;
                }
            };

            let jsonl_paths: Vec<PathBuf> = event
                .paths
                .into_iter()
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("jsonl"))
                .collect();
            if jsonl_paths.is_empty() {
                return;
            }

            for path in jsonl_paths {
                match event.kind {
                    EventKind::Remove(_) => {
                        cancel_timer(&watch_state, &path);
                        if tx.try_send(FileEvent::Removed(path)).is_err() {
                            warn!("event queue full or closed, dropping removal event");
                        }
                    }
                    EventKind::Modify(_) | EventKind::Create(_) => {
                        schedule_debounced(&watch_state, path, tx.clone(), debounce);
                    }
                    _ => {}
                }
            }
        })?;

        if root.exists() {
            watcher.watch(root, RecursiveMode::Recursive)?;
            info!(root = %root.display(), "watching transcript root");
        } else {
            warn!(root = %root.display(), "transcript root does not exist yet; watcher idle");
        }

        Ok(Self { _inner: watcher, state })
    }

    /// Mark `path` as currently being processed so a debounce firing for it
    /// while in flight is suppressed; the indexer is expected to re-check
    /// the file's mtime after [`mark_done`] and re-enqueue if it changed.
    pub fn mark_in_flight(&self, path: &Path) {
        self.state.in_flight.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn mark_done(&self, path: &Path) {
        self.state.in_flight.lock().unwrap().remove(path);
    }

    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.state.in_flight.lock().unwrap().contains(path)
    }

    /// Cancel all pending debounce timers. Idempotent. Dropping the watcher
    /// afterward ends the OS subscription; draining any queued events is the
    /// channel owner's responsibility.
    pub fn stop(&self) {
        let mut timers = self.state.timers.lock().unwrap();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        debug!("watcher stopped, pending debounce timers cancelled");
    }
}

fn cancel_timer(state: &Arc<DebounceState>, path: &Path) {
    if let Some(handle) = state.timers.lock().unwrap().remove(path) {
        handle.abort();
    }
}

fn schedule_debounced(state: &Arc<DebounceState>, path: PathBuf, tx: mpsc::Sender<FileEvent>, debounce: Duration) {
    let mut timers = state.timers.lock().unwrap();

    if let Some(existing) = timers.remove(&path) {
        existing.abort();
    }

    let timer_state = state.clone();
    let timer_path = path.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(debounce).await;
        timer_state.timers.lock().unwrap().remove(&timer_path);

        if timer_state.in_flight.lock().unwrap().contains(&timer_path) {
            debug!(path = %timer_path.display(), "path already in flight, suppressing duplicate event");
            return;
        }

        if tx.send(FileEvent::Changed(timer_path.clone())).await.is_err() {
            warn!(path = %timer_path.display(), "event queue closed, dropping change event");
        }
    });

    timers.insert(path, handle);
}

/// Walk every immediate project subdirectory of `root`, returning every
/// `.jsonl` file modified within the last 24 hours, newest first.
pub fn initial_scan(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    let cutoff = SystemTime::now() - Duration::from_secs(24 * 60 * 60);
    let mut entries: Vec<(PathBuf, SystemTime)> = Vec::new();

    let read_dir = match std::fs::read_dir(root) {
        Ok(rd) => rd,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "failed to read transcript root");
            return Vec::new();
        }
    };

    for project_entry in read_dir.flatten() {
        let project_path = project_entry.path();
        if !project_path.is_dir() {
            continue;
        }

        let sub_read = match std::fs::read_dir(&project_path) {
            Ok(rd) => rd,
            Err(_) => continue,
        };

        for file_entry in sub_read.flatten() {
            let file_path = file_entry.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let modified = match file_entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if modified >= cutoff {
                entries.push((file_path, modified));
            }
        }
    }

    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries.into_iter().map(|(path, _)| path).collect()
}

/// Every immediate subdirectory of the default transcript root
/// (`~/.claude/projects/`), used at startup to resolve watch targets.
pub fn default_transcript_root() -> WatcherResult<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("projects")).ok_or(WatcherError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    #[test]
    fn initial_scan_empty_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(initial_scan(dir.path()).is_empty());
    }

    #[test]
    fn initial_scan_finds_recent_jsonl_files() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join("proj");
        fs::create_dir(&project_dir).unwrap();
        let file_path = project_dir.join("session.jsonl");
        let mut f = fs::File::create(&file_path).unwrap();
        writeln!(f, r#"{{"type":"user"}}"#).unwrap();

        let result = initial_scan(dir.path());
        assert_eq!(result, vec![file_path]);
    }

    #[test]
    fn initial_scan_ignores_non_jsonl_files() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join("proj");
        fs::create_dir(&project_dir).unwrap();
        fs::File::create(project_dir.join("notes.txt")).unwrap();

        assert!(initial_scan(dir.path()).is_empty());
    }

    #[test]
    fn initial_scan_nonexistent_root_is_empty() {
        assert!(initial_scan(Path::new("/nonexistent/conversant/root")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_coalesces_rapid_reschedules_into_one_event() {
        let (tx, mut rx) = mpsc::channel(8);
        let state = Arc::new(DebounceState {
            timers: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        });
        let path = PathBuf::from("/tmp/session.jsonl");
        let debounce = Duration::from_millis(100);

        schedule_debounced(&state, path.clone(), tx.clone(), debounce);
        tokio::time::advance(Duration::from_millis(50)).await;
        schedule_debounced(&state, path.clone(), tx.clone(), debounce);
        tokio::time::advance(Duration::from_millis(150)).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event, FileEvent::Changed(path));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_path_suppresses_debounce_firing() {
        let (tx, mut rx) = mpsc::channel(8);
        let state = Arc::new(DebounceState {
            timers: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        });
        let path = PathBuf::from("/tmp/session.jsonl");
        state.in_flight.lock().unwrap().insert(path.clone());

        schedule_debounced(&state, path.clone(), tx, Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;

        assert!(rx.try_recv().is_err());
    }
}
