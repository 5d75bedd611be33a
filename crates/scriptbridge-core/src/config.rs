use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::pkg::registry::{DEFAULT_REGISTRY, REGISTRY_ENV};

/// Name of the optional per-vault configuration file.
pub const CONFIG_FILE: &str = "scriptbridge.json";

/// Default location of materialized libraries, relative to the vault root.
pub const DEFAULT_LIBRARY_DIR: &str = ".obsidian/plugins/scriptbridge/libs";

/// Default location of the persisted resolution cache, relative to the vault root.
pub const DEFAULT_CACHE_FILE: &str = ".obsidian/plugins/scriptbridge/data.json";

/// Default host configuration directory. Sources below it are never transformed.
pub const DEFAULT_CONFIG_DIR: &str = ".obsidian";

/// Runtime configuration for scriptbridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the vault all virtual paths are relative to.
    pub vault_root: PathBuf,

    /// Vault-relative directory packages are materialized into.
    pub library_dir: String,

    /// Vault-relative host configuration directory.
    pub config_dir: String,

    /// Vault-relative path of the persisted resolution cache.
    pub cache_file: String,

    /// npm registry base URL.
    pub registry: String,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

/// On-disk shape of `scriptbridge.json`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    library_dir: Option<String>,
    config_dir: Option<String>,
    cache_file: Option<String>,
    registry: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            library_dir: DEFAULT_LIBRARY_DIR.to_string(),
            config_dir: DEFAULT_CONFIG_DIR.to_string(),
            cache_file: DEFAULT_CACHE_FILE.to_string(),
            registry: std::env::var(REGISTRY_ENV).unwrap_or_else(|_| DEFAULT_REGISTRY.to_string()),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config rooted at the given vault directory.
    #[must_use]
    pub fn new(vault_root: PathBuf) -> Self {
        Self {
            vault_root,
            ..Default::default()
        }
    }

    /// Load the config for a vault, applying `scriptbridge.json` if present.
    pub fn load(vault_root: &Path) -> Result<Self, Error> {
        let vault_root = dunce::canonicalize(vault_root)?;
        let mut config = Self::new(vault_root);

        let path = config.vault_root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(config);
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let file: ConfigFile =
            serde_json::from_str(&raw).map_err(|source| Error::ConfigParse { path, source })?;

        if let Some(dir) = file.library_dir {
            config.library_dir = trim_slashes(&dir);
        }
        if let Some(dir) = file.config_dir {
            config.config_dir = trim_slashes(&dir);
        }
        if let Some(cache) = file.cache_file {
            config.cache_file = trim_slashes(&cache);
        }
        if let Some(registry) = file.registry {
            config.registry = registry;
        }

        Ok(config)
    }

    /// Set the registry URL.
    #[must_use]
    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = registry.into();
        self
    }

    /// Set the library directory.
    #[must_use]
    pub fn with_library_dir(mut self, dir: &str) -> Self {
        self.library_dir = trim_slashes(dir);
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Whether a vault-relative source path lives in the host configuration directory.
    #[must_use]
    pub fn is_config_path(&self, path: &str) -> bool {
        path == self.config_dir || path.starts_with(&format!("{}/", self.config_dir))
    }
}

fn trim_slashes(path: &str) -> String {
    path.trim_matches('/').replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.library_dir, DEFAULT_LIBRARY_DIR);
        assert_eq!(config.cache_file, DEFAULT_CACHE_FILE);
    }

    #[test]
    fn test_load_applies_file_overrides() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"libraryDir": "/scripts/libs/", "registry": "http://localhost:4873/"}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.library_dir, "scripts/libs");
        assert_eq!(config.registry, "http://localhost:4873/");
        assert_eq!(config.config_dir, DEFAULT_CONFIG_DIR);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();

        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_is_config_path() {
        let config = Config::new(PathBuf::from("/vault"));
        assert!(config.is_config_path(".obsidian/plugins/x/main.js"));
        assert!(!config.is_config_path(".obsidianish/file.js"));
        assert!(!config.is_config_path("scripts/view.jsx"));
    }

    #[test]
    #[serial]
    fn test_registry_env_overrides_default() {
        std::env::set_var(REGISTRY_ENV, "http://localhost:4873/");
        let config = Config::new(PathBuf::from("/vault"));
        std::env::remove_var(REGISTRY_ENV);
        assert_eq!(config.registry, "http://localhost:4873/");

        let config = Config::new(PathBuf::from("/vault"));
        assert_eq!(config.registry, DEFAULT_REGISTRY);
    }
}
