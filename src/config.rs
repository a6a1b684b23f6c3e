//! Observer settings and their layered loading.
//!
//! Layers, lowest precedence first: programmed defaults, the user file,
//! the project file (`<root>/treeshift.toml`), and an override value handed
//! in by the host. Problems loading a layer never fail the load; they are
//! reported as [`SettingsEvent`]s and the layer is skipped.

pub mod defaults;
pub mod settings;
pub mod user;

pub use settings::{ObserverSettings, SettingsFile};
pub use user::{load_user_config, user_config_path};

use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "treeshift.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsEventKind {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsEvent {
    pub kind: SettingsEventKind,
    pub message: String,
}

impl SettingsEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsLoadOutcome {
    pub settings: ObserverSettings,
    pub events: Vec<SettingsEvent>,
}

/// Merge two layers, preferring values from `primary` over `fallback`
pub fn merge_settings(
    fallback: Option<SettingsFile>,
    primary: Option<SettingsFile>,
) -> Option<SettingsFile> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(settings), None) | (None, Some(settings)) => Some(settings),
        (Some(fallback), Some(primary)) => Some(SettingsFile {
            lock_timeout_ms: primary.lock_timeout_ms.or(fallback.lock_timeout_ms),
            replay_cache_size: primary.replay_cache_size.or(fallback.replay_cache_size),
            history_warn_threshold: primary
                .history_warn_threshold
                .or(fallback.history_warn_threshold),
        }),
    }
}

/// Merge layers in order; later layers win.
pub fn merge_all(configs: &[Option<SettingsFile>]) -> Option<SettingsFile> {
    configs.iter().cloned().reduce(merge_settings).flatten()
}

pub fn parse_settings(text: &str) -> Result<SettingsFile, SettingsError> {
    Ok(toml::from_str(text)?)
}

pub fn load_settings_file(path: &Path) -> Result<SettingsFile, SettingsError> {
    parse_settings(&fs::read_to_string(path)?)
}

/// Resolve settings from every layer.
pub fn load_settings(root_path: Option<&Path>, override_settings: Option<Value>) -> SettingsLoadOutcome {
    let mut events = Vec::new();

    let defaults = Some(defaults::default_settings());
    let user_config = load_user_config_with_events(&mut events);
    let project_settings = load_project_settings(root_path, &mut events);
    let override_settings =
        override_settings.and_then(|value| parse_override_settings(value, &mut events));

    let merged = merge_all(&[defaults, user_config, project_settings, override_settings]);
    let settings = merged.map(ObserverSettings::from).unwrap_or_default();

    for event in &events {
        match event.kind {
            SettingsEventKind::Info => {
                log::debug!(target: "treeshift::settings", "{}", event.message)
            }
            SettingsEventKind::Warning => {
                log::warn!(target: "treeshift::settings", "{}", event.message)
            }
        }
    }

    SettingsLoadOutcome { settings, events }
}

fn load_user_config_with_events(events: &mut Vec<SettingsEvent>) -> Option<SettingsFile> {
    match load_user_config() {
        Ok(Some(settings)) => {
            events.push(SettingsEvent::info("Loaded user config from XDG_CONFIG_HOME"));
            Some(settings)
        }
        Ok(None) => None,
        Err(err) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to load user config: {}",
                err
            )));
            None
        }
    }
}

fn load_project_settings(
    root_path: Option<&Path>,
    events: &mut Vec<SettingsEvent>,
) -> Option<SettingsFile> {
    let config_path = root_path?.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return None;
    }

    match load_settings_file(&config_path) {
        Ok(settings) => {
            events.push(SettingsEvent::info(format!(
                "Loaded {}",
                config_path.display()
            )));
            Some(settings)
        }
        Err(err) => {
            events.push(SettingsEvent::warning(format!(
                "Ignoring {}: {}",
                config_path.display(),
                err
            )));
            None
        }
    }
}

fn parse_override_settings(value: Value, events: &mut Vec<SettingsEvent>) -> Option<SettingsFile> {
    match serde_json::from_value::<SettingsFile>(value) {
        Ok(settings) => Some(settings),
        Err(err) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to parse override settings: {}",
                err
            )));
            None
        }
    }
}
