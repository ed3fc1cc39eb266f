//! Optional TOML configuration for the `jarl` CLI driver: a stack-capacity
//! override plus the display preferences also settable as flags.
//!
//! Host-driver plumbing only — it has no bearing on `jarl::Vm::execute`'s
//! contract, which takes no configuration of its own.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

pub const CONFIG_FILE_NAME: &str = "jarl.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub no_color: bool,

    /// Overrides `Vm`'s default 1024-slot stack, for scripts with unusually
    /// deep recursion.
    #[serde(default = "default_stack_capacity")]
    pub stack_capacity: usize,
}

fn default_stack_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            no_color: false,
            stack_capacity: default_stack_capacity(),
        }
    }
}

impl Config {
    /// Searches the current directory, then `~/.config/jarl/`, then the
    /// platform config directory, for `jarl.toml`; falls back to defaults
    /// if none is found.
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CliError::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CliError::Config(format!("failed to parse configuration: {e}")))
    }

    fn check_current_dir_config() -> Option<PathBuf> {
        let path = PathBuf::from(CONFIG_FILE_NAME);
        path.exists().then_some(path)
    }

    fn check_home_config() -> Option<PathBuf> {
        dirs::home_dir()
            .map(|dir| dir.join(".config").join("jarl").join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    fn check_system_config() -> Option<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("jarl").join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    fn find_config_file() -> Option<PathBuf> {
        Self::check_current_dir_config()
            .or_else(Self::check_home_config)
            .or_else(Self::check_system_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_sane_stack_capacity() {
        let config = Config::default();
        assert_eq!(config.stack_capacity, 1024);
        assert!(!config.verbose);
    }

    #[test]
    fn round_trips_through_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jarl.toml");
        std::fs::write(
            &path,
            "verbose = true\nno_color = true\nstack_capacity = 4096\n",
        )
        .unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.verbose);
        assert!(config.no_color);
        assert_eq!(config.stack_capacity, 4096);
    }

    #[test]
    fn missing_path_is_an_error() {
        let result = Config::load_from_path(Path::new("/nonexistent/jarl.toml"));
        assert!(result.is_err());
    }
}
