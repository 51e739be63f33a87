// config.rs — Mirror configuration.
//
// The working directory is the one required setting; it normally comes
// from the `WORKDIR` environment variable. Everything else lives in an
// optional TOML settings file whose `[git]` table configures the adapter.

use std::path::{Path, PathBuf};

use repofs_vcs::GitConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the root working directory.
pub const WORKDIR_ENV: &str = "WORKDIR";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Contents of the optional settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub git: GitConfig,
}

impl SettingsFile {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load settings, falling back to defaults only when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

/// Everything the mirror layer needs to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Root under which `<org>/<repo>` mirrors are kept.
    pub workdir: PathBuf,

    #[serde(default)]
    pub git: GitConfig,
}

impl MirrorConfig {
    pub fn new(workdir: impl Into<PathBuf>, git: GitConfig) -> Self {
        Self {
            workdir: workdir.into(),
            git,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workdir.as_os_str().is_empty() {
            return Err(ConfigError::Missing(WORKDIR_ENV));
        }
        self.git
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
