use std::path::{Path, PathBuf};

use qraft_core::OutputKind;
use qraft_core::types::DEFAULT_SCALE;
use serde::Deserialize;

use crate::error::ServiceError;

/// Overrides `service.base_url`.
pub const API_URL_ENV: &str = "QRAFT_API_URL";

#[derive(Debug, Default, Deserialize)]
pub struct QraftConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_service_scale")]
    pub scale: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            scale: default_service_scale(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}
fn default_service_scale() -> u32 {
    DEFAULT_SCALE
}

/// Settings for generating locally with the embedded Python runtime.
#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_python")]
    pub python: String,
    /// Virtual environment location. Defaults to the user cache dir.
    pub env_dir: Option<PathBuf>,
    pub index_url: Option<String>,
    #[serde(default = "default_runtime_scale")]
    pub scale: u32,
    #[serde(default)]
    pub kind: OutputKind,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            env_dir: None,
            index_url: None,
            scale: default_runtime_scale(),
            kind: OutputKind::default(),
        }
    }
}

fn default_python() -> String {
    "python3".into()
}
fn default_runtime_scale() -> u32 {
    8
}

impl QraftConfig {
    /// `~/.config/qraft/config.toml` on Linux, the platform equivalent elsewhere.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("qraft").join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ServiceError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ServiceError> {
        toml::from_str(content)
            .map_err(|e| ServiceError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load from an explicit path (which must exist), or from the default
    /// path if a file is there. Falls back to defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ServiceError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "Loading config");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Apply `QRAFT_API_URL` if it is set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            self.apply_api_url(Some(url));
        }
    }

    pub fn apply_api_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.service.base_url = url.trim().to_string();
        }
    }
}
