//! Configuration Store
//!
//! Handles loading/saving the TOML settings file.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Unified reality-parser configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// External reconstruction engine
    #[serde(default)]
    pub engine: EngineConfig,

    /// Option values used when the command line does not give one
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from the first standard location that exists, or use defaults.
    ///
    /// A file that exists but does not parse is an error rather than a
    /// silent fallback.
    pub fn load_or_default() -> anyhow::Result<Self> {
        match super::find_config_file() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Get default config file path
    pub fn default_path() -> Option<PathBuf> {
        super::get_config_dir().map(|d| d.join("config.toml"))
    }
}

/// External engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Executable that performs the reconstruction
    #[serde(default = "default_program")]
    pub program: String,

    /// Extra arguments passed before the session arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory the engine writes intermediate files to
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

/// Default session options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_detail")]
    pub detail: String,

    #[serde(default = "default_ordering")]
    pub ordering: String,

    #[serde(default = "default_sensitivity")]
    pub sensitivity: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            detail: default_detail(),
            ordering: default_ordering(),
            sensitivity: default_sensitivity(),
        }
    }
}

fn default_program() -> String {
    "photogrammetry".to_string()
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("reality-parser").join("modelTemp")
}

fn default_detail() -> String {
    "medium".to_string()
}

fn default_ordering() -> String {
    "sequential".to_string()
}

fn default_sensitivity() -> String {
    "normal".to_string()
}
