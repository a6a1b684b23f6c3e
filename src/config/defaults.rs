//! Programmed defaults, the lowest settings layer.

use super::settings::SettingsFile;

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_REPLAY_CACHE_SIZE: usize = 1024;
pub const DEFAULT_HISTORY_WARN_THRESHOLD: usize = 1024;

/// The defaults as a settings layer with every field set.
pub fn default_settings() -> SettingsFile {
    SettingsFile {
        lock_timeout_ms: Some(DEFAULT_LOCK_TIMEOUT_MS),
        replay_cache_size: Some(DEFAULT_REPLAY_CACHE_SIZE),
        history_warn_threshold: Some(DEFAULT_HISTORY_WARN_THRESHOLD),
    }
}
