// crates/server/src/config.rs
//! Daemon configuration assembled from `CONVERSANT_`-prefixed environment
//! variables, falling back to sane defaults when unset.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub transcript_root: PathBuf,
    pub db_path: PathBuf,
    pub debounce_window: Duration,
    pub correlation_window_secs: i64,
    pub min_correlation_confidence: f64,
    pub fuzzy_threshold: f64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            transcript_root: env_path("CONVERSANT_TRANSCRIPT_ROOT").unwrap_or_else(default_transcript_root),
            db_path: env_path("CONVERSANT_DB_PATH").unwrap_or_else(default_db_path),
            debounce_window: Duration::from_millis(env_u64("CONVERSANT_DEBOUNCE_MS", 1_000)),
            correlation_window_secs: env_u64("CONVERSANT_CORRELATION_WINDOW_SECS", 20) as i64,
            min_correlation_confidence: env_f64("CONVERSANT_MIN_CORRELATION_CONFIDENCE", 0.5),
            fuzzy_threshold: env_f64("CONVERSANT_FUZZY_THRESHOLD", 0.6),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn default_transcript_root() -> PathBuf {
    dirs::home_dir().map(|h| h.join(".claude").join("projects")).unwrap_or_else(|| PathBuf::from(".claude/projects"))
}

fn default_db_path() -> PathBuf {
    conversant_store::default_db_path().unwrap_or_else(|_| PathBuf::from("conversations.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_dot_claude_tree() {
        let config = Config::from_env();
        assert!(config.transcript_root.ends_with("projects"));
        assert_eq!(config.debounce_window, Duration::from_millis(1_000));
        assert_eq!(config.min_correlation_confidence, 0.5);
        assert_eq!(config.fuzzy_threshold, 0.6);
    }
}
