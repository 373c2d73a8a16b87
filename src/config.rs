use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::localize::Language;

pub const CONFIG_VERSION: u64 = 1;

const URL_ENV: &str = "TASKMATE_SUPABASE_URL";
const ANON_KEY_ENV: &str = "TASKMATE_SUPABASE_ANON_KEY";

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("taskmate")
}

fn default_translate_url() -> String {
    "https://translate.googleapis.com/translate_a/single".into()
}

fn default_edit_debounce_ms() -> u64 {
    400
}

fn default_search_debounce_ms() -> u64 {
    400
}

fn default_action_throttle_ms() -> u64 {
    800
}

fn default_version() -> u64 {
    CONFIG_VERSION
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u64,
    /// Project URL of the hosted backend, e.g. `https://xyz.supabase.co`.
    pub supabase_url: String,
    /// Public anon key sent as the `apikey` header.
    pub supabase_anon_key: String,
    pub language: Language,
    pub debug_logging: bool,
    /// Keep the refresh token in the system keyring between runs.
    pub persist_session: bool,
    #[serde(default = "default_translate_url")]
    pub translate_url: String,
    #[serde(default = "default_edit_debounce_ms")]
    pub edit_debounce_ms: u64,
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
    #[serde(default = "default_action_throttle_ms")]
    pub action_throttle_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            language: Language::default(),
            debug_logging: false,
            persist_session: true,
            translate_url: default_translate_url(),
            edit_debounce_ms: default_edit_debounce_ms(),
            search_debounce_ms: default_search_debounce_ms(),
            action_throttle_ms: default_action_throttle_ms(),
        }
    }
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        default_config_dir().join("config.json")
    }

    /// Load the config at `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.version != CONFIG_VERSION {
            log::warn!(
                "Config version {} differs from {}, unknown fields take defaults",
                config.version,
                CONFIG_VERSION
            );
        }
        Ok(config)
    }

    /// Load the config, falling back to defaults when it cannot be read.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load_from(path).unwrap_or_else(|e| {
            log::warn!("{}; using defaults", e);
            Self::default()
        })
    }

    /// Override backend settings from the environment. `lookup` is injected
    /// so tests don't touch the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.supabase_url = url;
        }
        if let Some(key) = lookup(ANON_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.supabase_anon_key = key;
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn edit_debounce(&self) -> Duration {
        Duration::from_millis(self.edit_debounce_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn action_throttle(&self) -> Duration {
        Duration::from_millis(self.action_throttle_ms)
    }
}
