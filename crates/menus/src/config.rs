//! Search paths and engine configuration.
//!
//! Directories come from the XDG environment variables with the usual
//! fallbacks. The user directory is always first in every list.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MenuError, Result};

const DEFAULT_CONFIG_DIRS: &str = "/etc/xdg";
const DEFAULT_DATA_DIRS: &str = "/usr/local/share:/usr/share";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuConfig {
    /// User config dir first, then system config dirs.
    pub config_dirs: Vec<PathBuf>,
    /// User data dir first, then system data dirs.
    pub data_dirs: Vec<PathBuf>,
    /// Desktop name used to filter `OnlyShowIn` / `NotShowIn`.
    #[serde(default)]
    pub desktop: Option<String>,
    /// Install filesystem watches on scanned directories and read menu files.
    #[serde(default = "default_watch")]
    pub watch: bool,
}

fn default_watch() -> bool {
    true
}

impl MenuConfig {
    /// Builds a configuration from the XDG environment.
    pub fn from_env() -> Self {
        let home = dirs::home_dir().unwrap_or_default();
        let config_home = env_path("XDG_CONFIG_HOME").unwrap_or_else(|| home.join(".config"));
        let data_home = env_path("XDG_DATA_HOME").unwrap_or_else(|| home.join(".local/share"));
        let config_dirs =
            std::env::var("XDG_CONFIG_DIRS").unwrap_or_else(|_| DEFAULT_CONFIG_DIRS.to_string());
        let data_dirs =
            std::env::var("XDG_DATA_DIRS").unwrap_or_else(|_| DEFAULT_DATA_DIRS.to_string());
        let desktop = std::env::var("XDG_CURRENT_DESKTOP")
            .ok()
            .and_then(|value| value.split(':').next().map(str::to_string))
            .filter(|value| !value.is_empty());

        Self {
            config_dirs: search_path(config_home, &config_dirs),
            data_dirs: search_path(data_home, &data_dirs),
            desktop,
            watch: true,
        }
    }

    /// Builds a configuration rooted at explicit directories, without watches.
    pub fn with_dirs(config_dirs: Vec<PathBuf>, data_dirs: Vec<PathBuf>) -> Self {
        Self {
            config_dirs,
            data_dirs,
            desktop: None,
            watch: false,
        }
    }

    /// Loads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|error| MenuError::io(path, error))?;
        serde_json::from_slice(&bytes).map_err(|error| {
            MenuError::InvalidInput(format!(
                "invalid menu configuration {}: {error}",
                path.display()
            ))
        })
    }

    pub fn user_config_dir(&self) -> Option<&Path> {
        self.config_dirs.first().map(PathBuf::as_path)
    }

    /// `<config>/menus` for every config dir.
    pub fn menu_dirs(&self) -> Vec<PathBuf> {
        self.config_dirs.iter().map(|dir| dir.join("menus")).collect()
    }

    pub fn user_menu_dir(&self) -> Option<PathBuf> {
        self.user_config_dir().map(|dir| dir.join("menus"))
    }

    pub fn app_dirs(&self) -> Vec<PathBuf> {
        self.data_dirs
            .iter()
            .map(|dir| dir.join("applications"))
            .collect()
    }

    pub fn directory_dirs(&self) -> Vec<PathBuf> {
        self.data_dirs
            .iter()
            .map(|dir| dir.join("desktop-directories"))
            .collect()
    }

    pub fn kde_legacy_dirs(&self) -> Vec<PathBuf> {
        self.data_dirs.iter().map(|dir| dir.join("applnk")).collect()
    }

    /// `<config>/menus/<name>-merged` for every config dir.
    pub fn merged_dirs(&self, menu_basename: &str) -> Vec<PathBuf> {
        let stem = menu_basename.strip_suffix(".menu").unwrap_or(menu_basename);
        self.menu_dirs()
            .into_iter()
            .map(|dir| dir.join(format!("{stem}-merged")))
            .collect()
    }

    /// Override directory holding edited copies for one logical menu.
    pub fn edits_dir(&self, menu_basename: &str) -> Option<PathBuf> {
        let stem = menu_basename.strip_suffix(".menu").unwrap_or(menu_basename);
        self.user_menu_dir()
            .map(|dir| dir.join(format!("{stem}-edits")))
    }
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Joins a user directory with a `:`-separated system list.
fn search_path(user: PathBuf, system: &str) -> Vec<PathBuf> {
    let mut dirs = vec![user];
    for entry in system.split(':') {
        if entry.is_empty() {
            continue;
        }
        let path = PathBuf::from(entry);
        if !dirs.contains(&path) {
            dirs.push(path);
        }
    }
    dirs
}
