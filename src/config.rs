//! Global application configuration for Raven

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{RavenError, Result};

/// Global Raven configuration (config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default vault path
    #[serde(default)]
    pub vault: Option<PathBuf>,

    /// Named vaults
    #[serde(default)]
    pub vaults: HashMap<String, PathBuf>,

    /// Which named vault to use when none is given
    #[serde(default)]
    pub default_vault: Option<String>,

    /// Editor to use for opening files
    #[serde(default)]
    pub editor: Option<String>,
}

impl Config {
    /// Load config from default location (~/.config/raven/config.toml)
    pub fn load() -> Result<Self> {
        let config_path = Self::default_path();

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;

        toml::from_str(&contents)
            .map_err(|e| RavenError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Pick the vault path: an explicit flag wins, then a named vault,
    /// then the `vault` key, then the default named vault.
    pub fn resolve_vault(&self, flag: Option<PathBuf>, name: Option<&str>) -> Result<PathBuf> {
        if let Some(path) = flag {
            return Ok(path);
        }
        if let Some(name) = name {
            return self
                .vaults
                .get(name)
                .cloned()
                .ok_or_else(|| RavenError::Config(format!("no vault named '{}'", name)));
        }
        if let Some(path) = &self.vault {
            return Ok(path.clone());
        }
        if let Some(default) = &self.default_vault {
            return self
                .vaults
                .get(default)
                .cloned()
                .ok_or_else(|| RavenError::Config(format!("default vault '{}' is not defined", default)));
        }
        std::env::current_dir().map_err(RavenError::Io)
    }

    /// Get default config file path
    /// Checks ~/.config/raven/config.toml first (XDG style),
    /// then falls back to OS-specific location
    pub fn default_path() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("raven").join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("raven")
            .join("config.toml")
    }

    /// Create default config file if it doesn't exist
    pub fn create_default() -> Result<PathBuf> {
        let config_path = Self::default_path();

        if config_path.exists() {
            return Ok(config_path);
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let default_config = r#"# Raven Configuration

# Default vault path (uncomment and set your path)
# vault = "/path/to/your/vault"

# Named vaults
# [vaults]
# work = "/path/to/work-vault"
# personal = "/path/to/personal-vault"
# default_vault = "personal"

# Editor for opening files (defaults to $EDITOR)
# editor = "code"
"#;

        std::fs::write(&config_path, default_config)?;

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multi_vault_config() {
        let toml = r#"
default_vault = "personal"
editor = "hx"

[vaults]
personal = "/home/u/vault"
work = "/home/u/work"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.default_vault.as_deref(), Some("personal"));
        assert_eq!(config.vaults.len(), 2);

        let resolved = config.resolve_vault(None, None).unwrap();
        assert_eq!(resolved, PathBuf::from("/home/u/vault"));

        let named = config.resolve_vault(None, Some("work")).unwrap();
        assert_eq!(named, PathBuf::from("/home/u/work"));
    }

    #[test]
    fn test_flag_wins() {
        let config = Config::default();
        let resolved = config
            .resolve_vault(Some(PathBuf::from("/explicit")), Some("ignored"))
            .unwrap();
        assert_eq!(resolved, PathBuf::from("/explicit"));
    }

    #[test]
    fn test_unknown_named_vault_errors() {
        let config = Config::default();
        assert!(config.resolve_vault(None, Some("nope")).is_err());
    }
}
