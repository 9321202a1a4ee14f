use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::paths::ProjectPaths;

pub const APP_NAME: &str = "scriptorium";

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found")]
    NotFound,
    #[error("Failed to parse config: {0}")]
    Parse(String),
    #[error("IO error reading config: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `<id>.toml` script records (default: <data_dir>/scripts)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl StoreConfig {
    /// Get the script directory path (use provided or default)
    pub fn script_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            ProjectPaths::new(APP_NAME)
                .map(|p| p.scripts_dir())
                .unwrap_or_else(|| PathBuf::from(".scripts"))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutorunConfig {
    /// Levels to autorun at startup, in order
    #[serde(default = "default_levels")]
    pub levels: Vec<i32>,

    /// Start autorun scripts in the background
    #[serde(default, rename = "async")]
    pub run_async: bool,
}

fn default_levels() -> Vec<i32> {
    vec![0]
}

impl Default for AutorunConfig {
    fn default() -> Self {
        Self {
            levels: default_levels(),
            run_async: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Program each script is handed to
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the script source
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// How often a running child checks for cancellation (default: 10ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_program() -> String {
    "sh".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-c".to_string()]
}

fn default_poll_interval() -> u64 {
    10
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to <data_dir>/logs/scriptorium.log
    #[serde(default)]
    pub file: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptoriumConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub autorun: AutorunConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ScriptoriumConfig {
    /// Default config file location; `None` without a home directory
    pub fn config_path() -> Option<PathBuf> {
        ProjectPaths::new(APP_NAME).map(|p| p.config_file())
    }

    pub fn load() -> Result<Self, ConfigLoadError> {
        let path = Self::config_path().ok_or(ConfigLoadError::NotFound)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigLoadError::Io(e.to_string()))?;
        let config = toml::from_str(&content).map_err(|e| ConfigLoadError::Parse(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self)?;
        fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}
