use super::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One layer of settings as written in a `treeshift.toml` file or passed in
/// by the host. Unset fields fall through to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsFile {
    /// Longest wait for the structural lock, in milliseconds.
    pub lock_timeout_ms: Option<u64>,
    /// Memoized mapping results kept per staging position; 0 disables.
    pub replay_cache_size: Option<usize>,
    /// Retained history length past which a warning is logged.
    pub history_warn_threshold: Option<usize>,
}

/// Fully resolved settings an observer runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverSettings {
    pub lock_timeout: Duration,
    pub replay_cache_size: usize,
    pub history_warn_threshold: usize,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        ObserverSettings {
            lock_timeout: Duration::from_millis(defaults::DEFAULT_LOCK_TIMEOUT_MS),
            replay_cache_size: defaults::DEFAULT_REPLAY_CACHE_SIZE,
            history_warn_threshold: defaults::DEFAULT_HISTORY_WARN_THRESHOLD,
        }
    }
}

impl From<SettingsFile> for ObserverSettings {
    fn from(file: SettingsFile) -> Self {
        let fallback = ObserverSettings::default();
        ObserverSettings {
            lock_timeout: file
                .lock_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(fallback.lock_timeout),
            replay_cache_size: file.replay_cache_size.unwrap_or(fallback.replay_cache_size),
            history_warn_threshold: file
                .history_warn_threshold
                .unwrap_or(fallback.history_warn_threshold),
        }
    }
}
