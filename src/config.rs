use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::totals::DEFAULT_VAT_RATE;

pub const DEFAULT_DATA_ROOT: &str = "~/Documents/QuoteDesk";
pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppSettings {
    pub data_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_vat_rate: Option<f64>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            data_root: DEFAULT_DATA_ROOT.to_string(),
            log_level: None,
            default_vat_rate: None,
        }
    }
}

impl AppSettings {
    pub fn data_root(&self) -> PathBuf {
        PathBuf::from(expand_home_dir(&self.data_root))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn vat_rate(&self) -> f64 {
        self.default_vat_rate.unwrap_or(DEFAULT_VAT_RATE)
    }

    pub fn output_root(&self) -> PathBuf {
        self.data_root().join("output")
    }

    pub fn template_dir(&self) -> PathBuf {
        self.data_root().join("templates")
    }
}

pub fn config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "quote-desk", "app") {
        return proj_dirs.config_dir().join("settings.toml");
    }
    PathBuf::from("settings.toml")
}

/// Reads settings, or `None` when the file does not exist yet.
pub fn load_settings(path: &Path) -> anyhow::Result<Option<AppSettings>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let settings = toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(settings))
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let toml_str = toml::to_string_pretty(settings).context("failed to encode settings")?;
    fs::write(path, toml_str).with_context(|| format!("failed to save {}", path.display()))?;
    Ok(())
}

pub fn expand_home_dir(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(base_dirs) = BaseDirs::new() {
            let home = base_dirs.home_dir().to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
