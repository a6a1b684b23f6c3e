//! User-wide settings from the XDG config directory.
//!
//! Location: `$XDG_CONFIG_HOME/treeshift/treeshift.toml`, falling back to
//! `~/.config/treeshift/treeshift.toml` on every platform.

use super::{CONFIG_FILE_NAME, SettingsError, SettingsFile, load_settings_file};
use std::path::PathBuf;

/// Path of the user settings file, or `None` when `XDG_CONFIG_HOME` is unset
/// and the home directory cannot be determined.
pub fn user_config_path() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => dirs::home_dir()?.join(".config"),
    };
    Some(base.join("treeshift").join(CONFIG_FILE_NAME))
}

/// Load the user settings file. A missing file is not an error.
pub fn load_user_config() -> Result<Option<SettingsFile>, SettingsError> {
    let Some(path) = user_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    load_settings_file(&path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn with_xdg<R>(value: Option<&std::path::Path>, f: impl FnOnce() -> R) -> R {
        let original = env::var_os("XDG_CONFIG_HOME");
        // SAFETY: #[serial(xdg_env)] prevents concurrent modification of XDG_CONFIG_HOME
        unsafe {
            match value {
                Some(path) => env::set_var("XDG_CONFIG_HOME", path),
                None => env::remove_var("XDG_CONFIG_HOME"),
            }
        }
        let result = f();
        // SAFETY: same as above, restoring the original value
        unsafe {
            match original {
                Some(val) => env::set_var("XDG_CONFIG_HOME", val),
                None => env::remove_var("XDG_CONFIG_HOME"),
            }
        }
        result
    }

    #[test]
    #[serial(xdg_env)]
    fn test_user_config_path_uses_xdg_config_home() {
        let path = with_xdg(Some(std::path::Path::new("/custom/config")), user_config_path);
        assert_eq!(
            path,
            Some(PathBuf::from("/custom/config/treeshift/treeshift.toml"))
        );
    }

    #[test]
    #[serial(xdg_env)]
    fn test_user_config_path_falls_back_to_home_config() {
        let expected = dirs::home_dir().map(|home| home.join(".config/treeshift/treeshift.toml"));
        assert_eq!(with_xdg(None, user_config_path), expected);
    }

    #[test]
    #[serial(xdg_env)]
    fn test_empty_xdg_config_home_is_ignored() {
        let expected = dirs::home_dir().map(|home| home.join(".config/treeshift/treeshift.toml"));
        assert_eq!(with_xdg(Some(std::path::Path::new("")), user_config_path), expected);
    }

    #[test]
    #[serial(xdg_env)]
    fn test_missing_user_config_is_not_an_error() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let loaded = with_xdg(Some(dir.path()), load_user_config);
        assert!(matches!(loaded, Ok(None)));
    }

    #[test]
    #[serial(xdg_env)]
    fn test_user_config_is_loaded() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let config_dir = dir.path().join("treeshift");
        std::fs::create_dir_all(&config_dir).expect("failed to create config dir");
        std::fs::write(config_dir.join("treeshift.toml"), "replayCacheSize = 16\n")
            .expect("failed to write user config");

        let loaded = with_xdg(Some(dir.path()), load_user_config).expect("readable config");
        assert_eq!(loaded.and_then(|file| file.replay_cache_size), Some(16));
    }
}
