//! Vault configuration (raven.yaml) and vault path helpers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{RavenError, Result};
use crate::parser::ParseOptions;

/// Per-vault configuration loaded from `raven.yaml` at the vault root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Directory holding daily notes
    #[serde(default = "default_daily_directory")]
    pub daily_directory: String,

    #[serde(default)]
    pub directories: Directories,

    /// Saved queries by name
    #[serde(default)]
    pub queries: HashMap<String, SavedQuery>,

    /// Quick-capture target (parsed for completeness; capture pipelines
    /// live above the core)
    #[serde(default)]
    pub capture: Option<CaptureConfig>,

    #[serde(default)]
    pub deletion: DeletionConfig,

    /// Path prefixes the mutation layer refuses to move or delete
    #[serde(default)]
    pub protected_prefixes: Vec<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        VaultConfig {
            daily_directory: default_daily_directory(),
            directories: Directories::default(),
            queries: HashMap::new(),
            capture: None,
            deletion: DeletionConfig::default(),
            protected_prefixes: Vec::new(),
        }
    }
}

fn default_daily_directory() -> String {
    "daily".to_string()
}

/// Optional root directories for the different kinds of files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Directories {
    #[serde(default)]
    pub object: Option<String>,

    #[serde(default)]
    pub page: Option<String>,

    #[serde(default)]
    pub workflow: Option<String>,

    #[serde(default)]
    pub template: Option<String>,
}

/// A named query stored in vault config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedQuery {
    pub query: String,

    /// Positional argument names, interpolated as $1..$n
    #[serde(default)]
    pub args: Option<Vec<String>>,

    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub file: Option<String>,

    #[serde(default)]
    pub heading: Option<String>,
}

/// How `delete` disposes of files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfig {
    #[serde(default = "default_deletion_mode")]
    pub mode: DeletionMode,

    #[serde(default = "default_trash_dir")]
    pub trash_dir: String,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        DeletionConfig {
            mode: DeletionMode::Trash,
            trash_dir: default_trash_dir(),
        }
    }
}

fn default_deletion_mode() -> DeletionMode {
    DeletionMode::Trash
}

fn default_trash_dir() -> String {
    ".trash".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionMode {
    Trash,
    Permanent,
}

impl VaultConfig {
    /// Load from `<vault>/raven.yaml`; a missing file yields defaults.
    pub fn load(vault_path: &Path) -> Result<Self> {
        let config_path = vault_path.join("raven.yaml");

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RavenError::Config(format!("failed to parse raven.yaml: {}", e)))
    }

    /// Parser knobs derived from this config.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            object_root: self.directories.object.clone(),
            page_root: self.directories.page.clone(),
            daily_dir: self.daily_directory.clone(),
        }
    }

    /// Whether a vault-relative path falls under a protected prefix.
    pub fn is_protected(&self, relative_path: &str) -> bool {
        self.protected_prefixes
            .iter()
            .any(|p| relative_path == p || relative_path.starts_with(&format!("{}/", p.trim_end_matches('/'))))
    }
}

/// Resolve a vault-relative path, refusing anything that escapes the
/// vault root (`..`, absolute paths).
pub fn vault_join(vault_path: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    if rel.is_absolute() {
        return Err(RavenError::OutOfVault(relative.to_string()));
    }
    for component in rel.components() {
        match component {
            std::path::Component::Normal(_) | std::path::Component::CurDir => {}
            _ => return Err(RavenError::OutOfVault(relative.to_string())),
        }
    }
    Ok(vault_path.join(rel))
}

/// Create a default raven.yaml file
pub fn create_default_vault_config(vault_path: &Path) -> Result<()> {
    let config_path = vault_path.join("raven.yaml");

    let default_config = r#"# Raven Vault Configuration

daily_directory: daily

directories:
  # object: objects
  # page: pages
  # template: templates

queries:
  today:
    query: "trait:due value:today"
    description: Everything due today
  active-projects:
    query: "object:project .status:active"
    description: Projects currently in flight

deletion:
  mode: trash
  trash_dir: .trash

protected_prefixes:
  - templates
"#;

    std::fs::write(&config_path, default_config)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempdir().unwrap();
        let config = VaultConfig::load(dir.path()).unwrap();

        assert_eq!(config.daily_directory, "daily");
        assert_eq!(config.deletion.mode, DeletionMode::Trash);
        assert_eq!(config.deletion.trash_dir, ".trash");
    }

    #[test]
    fn test_load_custom() {
        let dir = tempdir().unwrap();
        let yaml = r#"
daily_directory: journal
directories:
  object: objects
queries:
  due-today:
    query: "trait:due value:today"
    description: Due today
protected_prefixes:
  - templates
deletion:
  mode: permanent
"#;
        std::fs::write(dir.path().join("raven.yaml"), yaml).unwrap();
        let config = VaultConfig::load(dir.path()).unwrap();

        assert_eq!(config.daily_directory, "journal");
        assert_eq!(config.directories.object.as_deref(), Some("objects"));
        assert!(config.queries.contains_key("due-today"));
        assert_eq!(config.deletion.mode, DeletionMode::Permanent);
        assert!(config.is_protected("templates/meeting.md"));
        assert!(!config.is_protected("projects/a.md"));
    }

    #[test]
    fn test_vault_join_rejects_escape() {
        let dir = tempdir().unwrap();
        assert!(vault_join(dir.path(), "notes/a.md").is_ok());
        assert!(vault_join(dir.path(), "../outside.md").is_err());
        assert!(vault_join(dir.path(), "/etc/passwd").is_err());
    }

    #[test]
    fn test_default_config_roundtrips() {
        let dir = tempdir().unwrap();
        create_default_vault_config(dir.path()).unwrap();
        let config = VaultConfig::load(dir.path()).unwrap();

        assert!(config.queries.contains_key("today"));
        assert!(config.is_protected("templates"));
    }
}
