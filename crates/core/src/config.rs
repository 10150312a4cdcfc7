//! Viewer configuration.
//!
//! The configuration is a small TOML document with three tables:
//!
//! ```toml
//! [window]
//! width = 800
//! height = 600
//! title = "Vulkan"
//!
//! [assets]
//! model = "models/viking_room.obj"
//! texture = "textures/viking_room.png"
//! vertex_shader = "shaders/sampler_vert.spv"
//! fragment_shader = "shaders/sampler_frag.spv"
//!
//! [debug]
//! validation = true
//! log_filter = "info,viewer=debug"
//! ```
//!
//! Every field has a default, so a partial document (or none at all) is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::DEFAULT_LOG_FILTER;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error while reading the file
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parse error
    #[error("parse error: {0}")]
    Parse(String),

    /// A value that parsed but cannot be used
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Window settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Vulkan".to_string(),
        }
    }
}

/// Asset locations, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub model: PathBuf,
    pub texture: PathBuf,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/viking_room.obj"),
            texture: PathBuf::from("textures/viking_room.png"),
            vertex_shader: PathBuf::from("shaders/sampler_vert.spv"),
            fragment_shader: PathBuf::from("shaders/sampler_frag.spv"),
        }
    }
}

/// Diagnostics settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Request `VK_LAYER_KHRONOS_validation`; a missing layer is then fatal.
    pub validation: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Complete viewer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window: WindowConfig,
    pub assets: AssetConfig,
    pub debug: DebugConfig,
}

impl ViewerConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Validation`] for unusable values.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise
    /// the errors of [`ViewerConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check values that deserialize fine but cannot drive the viewer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Validation(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        let assets = [
            ("model", &self.assets.model),
            ("texture", &self.assets.texture),
            ("vertex_shader", &self.assets.vertex_shader),
            ("fragment_shader", &self.assets.fragment_shader),
        ];
        for (name, path) in assets {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "asset path '{}' is empty",
                    name
                )));
            }
        }

        Ok(())
    }
}
