use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FreightError, Result};
use crate::grid::GridTiming;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_blur_commit_ms")]
    pub blur_commit_ms: u64,
    #[serde(default = "default_navigation_delay_ms")]
    pub navigation_delay_ms: u64,
    /// When false the companies/locations lists are the built-in defaults and
    /// cannot be extended.
    #[serde(default = "default_shared_reference_data")]
    pub shared_reference_data: bool,
}

fn default_blur_commit_ms() -> u64 {
    200
}

fn default_navigation_delay_ms() -> u64 {
    100
}

fn default_shared_reference_data() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            blur_commit_ms: default_blur_commit_ms(),
            navigation_delay_ms: default_navigation_delay_ms(),
            shared_reference_data: default_shared_reference_data(),
        }
    }
}

impl Settings {
    pub fn timing(&self) -> GridTiming {
        GridTiming {
            blur_commit: Duration::from_millis(self.blur_commit_ms),
            navigation: Duration::from_millis(self.navigation_delay_ms),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("freightlog")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("freightlog")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| FreightError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn get_data_dir() -> PathBuf {
    PathBuf::from(&load_settings().data_dir)
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
