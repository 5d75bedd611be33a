//! Persisted resolution cache.
//!
//! Records every materialized `name@version` and the latest version seen
//! per package name. Entries are only ever added or overwritten, never
//! evicted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;

use crate::error::Error;
use crate::pkg::{package_key, split_package_key, LATEST};
use crate::transform::{ImportPathEntry, ImportPathTable};
use crate::vfs::VirtualFs;
use crate::vpath;

/// One materialized package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Vault-relative directory holding the package's files.
    pub base_dir: String,
    /// Vault-relative paths of the written files.
    #[serde(default)]
    pub files: Vec<String>,
    /// Entry point relative to `base_dir`.
    #[serde(default)]
    pub entry_point: String,
    /// Dependencies as `name@version` keys.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Registry latest version when the package was resolved.
    #[serde(default)]
    pub latest: String,
}

impl CacheEntry {
    #[must_use]
    pub fn import_path(&self) -> ImportPathEntry {
        ImportPathEntry {
            base_dir: self.base_dir.clone(),
            files: self.files.clone(),
            entry_point: self.entry_point.clone(),
        }
    }
}

/// The persisted cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionCache {
    #[serde(default)]
    pub downloaded_libraries: BTreeMap<String, CacheEntry>,
    /// Bare package name to its latest known version.
    #[serde(default)]
    pub latest_version_index: BTreeMap<String, String>,
}

impl ResolutionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the cache at vault-relative `path`. A missing file is an empty cache.
    pub fn load(vfs: &dyn VirtualFs, path: &str) -> Result<Self, Error> {
        let raw = match vfs.read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(Error::Cache {
                    path: path.to_string(),
                    message: e.to_string(),
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str(&raw).map_err(|e| Error::Cache {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Write the cache as pretty JSON, creating its directory first.
    pub fn save(&self, vfs: &dyn VirtualFs, path: &str) -> Result<(), Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| Error::Cache {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        let dir = vpath::dirname(path);
        if !dir.is_empty() {
            vfs.create_dir_all(dir)?;
        }
        vfs.write(path, &content)?;
        Ok(())
    }

    /// The key a request for `name@version` would be served from.
    ///
    /// `latest` goes through the latest-version index.
    #[must_use]
    pub fn key_for(&self, name: &str, version: &str) -> Option<String> {
        if version == LATEST {
            self.latest_version_index
                .get(name)
                .map(|latest| package_key(name, latest))
        } else {
            Some(package_key(name, version))
        }
    }

    /// Whether `name@version` is materialized with at least one file.
    #[must_use]
    pub fn is_cached(&self, name: &str, version: &str) -> bool {
        self.cached_entry(name, version).is_some()
    }

    /// The materialized entry serving `name@version`, if any.
    #[must_use]
    pub fn cached_entry(&self, name: &str, version: &str) -> Option<(String, &CacheEntry)> {
        let key = self.key_for(name, version)?;
        let entry = self.downloaded_libraries.get(&key)?;
        if entry.files.is_empty() {
            return None;
        }
        Some((key, entry))
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: CacheEntry) {
        self.downloaded_libraries.insert(key.into(), entry);
    }

    /// Record `version` as the latest version of `name`.
    pub fn set_latest(&mut self, name: impl Into<String>, version: impl Into<String>) {
        let version = version.into();
        if !version.is_empty() {
            self.latest_version_index.insert(name.into(), version);
        }
    }

    /// Every cached package as an import table.
    #[must_use]
    pub fn import_paths(&self) -> ImportPathTable {
        self.downloaded_libraries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.import_path()))
            .collect()
    }

    /// Keys of the packages with at least one file.
    pub fn materialized_keys(&self) -> impl Iterator<Item = &str> {
        self.downloaded_libraries
            .iter()
            .filter(|(_, entry)| !entry.files.is_empty())
            .map(|(key, _)| key.as_str())
    }

    /// Names that have an entry, regardless of version.
    #[must_use]
    pub fn has_package(&self, name: &str) -> bool {
        self.downloaded_libraries
            .keys()
            .filter_map(|key| split_package_key(key))
            .any(|(n, _)| n == name)
    }
}
