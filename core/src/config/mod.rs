//! Configuration management
//!
//! Settings live in a TOML file. Command line flags override file values.

pub mod store;

pub use store::{Config, DefaultsConfig, EngineConfig};

use std::path::PathBuf;

/// File name looked up in the current directory
pub const LOCAL_CONFIG_FILE: &str = "reality-parser.toml";

/// Find the configuration file in standard locations
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        let path = cwd.join(LOCAL_CONFIG_FILE);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(path) = Config::default_path() {
        if path.exists() {
            return Some(path);
        }
    }

    None
}

/// Get the configuration directory path
pub fn get_config_dir() -> Option<PathBuf> {
    if let Some(dir) = dirs::config_dir() {
        return Some(dir.join("reality-parser"));
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".config").join("reality-parser"));
    }

    None
}
