//! Config file discovery and layered merging.
//!
//! Two layers are read, later overriding earlier:
//! 1. the user layer, `config.toml` in `$AKF_CONFIG_DIR` or the platform
//!    config dir (`~/.config/akf` on Linux)
//! 2. the project layer, `akf.toml` in the scenario's working directory
//!
//! CLI flags are applied on top by the binary. A layer that exists but
//! cannot be read or parsed is skipped with a warning so a broken user file
//! never blocks a guest agent from starting.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{AkfConfig, ConfigError, Result};

const PROJECT_CONFIG_FILE: &str = "akf.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const APP_NAME: &str = "akf";

/// Overrides the user config directory.
const CONFIG_DIR_ENV: &str = "AKF_CONFIG_DIR";

/// Which layer a config file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    User,
    Project,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Project => f.write_str("project"),
        }
    }
}

/// A config file that was considered during discovery.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub layer: Layer,
    pub path: PathBuf,
    /// Whether the file existed and merged cleanly.
    pub loaded: bool,
}

/// Merged configuration plus a record of how it was assembled.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: AkfConfig,
    /// Every layer checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// One entry per layer that was present but skipped.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of the layers that contributed to `config`.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }

    fn apply(&mut self, layer: Layer, path: PathBuf) {
        let loaded = path.is_file()
            && match load_config_file(&path) {
                Ok(parsed) => {
                    self.config.merge(parsed);
                    true
                }
                Err(e) => {
                    self.warnings.push(format!("ignoring {} config: {}", layer, e));
                    false
                }
            };
        self.sources.push(ConfigSource { layer, path, loaded });
    }
}

/// Discover and merge the user and project layers.
///
/// `project_dir` defaults to the current directory.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with `config_dir` replacing the user config
/// directory lookup entirely.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => user_config_path(),
    };
    let project = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));

    let mut loaded = LoadedConfig::default();
    if let Some(path) = user {
        loaded.apply(Layer::User, path);
    }
    loaded.apply(Layer::Project, project);
    Ok(loaded)
}

/// Parse a single config file, bypassing discovery.
pub fn load_config_file(path: &Path) -> Result<AkfConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    AkfConfig::from_toml(&contents)
}

/// The user layer's config file.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// `$AKF_CONFIG_DIR` when set and non-empty, else `<platform config dir>/akf`.
///
/// Also the parent of the default log directory.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}
