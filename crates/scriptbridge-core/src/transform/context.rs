//! Per-file transform context.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Where one installed package lives and what it contains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPathEntry {
    /// Vault-relative directory the package was materialized into.
    pub base_dir: String,
    /// Vault-relative paths of every materialized file.
    pub files: Vec<String>,
    /// Entry point relative to `base_dir`.
    pub entry_point: String,
}

/// Installed packages keyed by `name@version`.
pub type ImportPathTable = BTreeMap<String, ImportPathEntry>;

/// Everything the transform and path resolver know about the world while
/// rewriting one file. Built fresh per file.
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    /// Vault-relative paths of the vault's own files.
    pub vault_files: BTreeSet<String>,
    /// Absolute vault root; absolute origin paths are made relative to it.
    pub vault_root: String,
    /// Directory relative imports resolve against when no origin file is known.
    pub outer_base_dir: String,
    pub import_paths: ImportPathTable,
    /// `name@version` keys of the packages the requesting file depends on.
    pub dependencies: Vec<String>,
    /// Bare name to latest resolved version.
    pub latest_versions: BTreeMap<String, String>,
    /// Version of the package the file belongs to, if any.
    pub current_version: Option<String>,
    /// Set by [`transform`](super::transform) before the assignment-only pass.
    pub second_pass: bool,
}

impl TransformContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vault_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vault_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_vault_root(mut self, root: impl Into<String>) -> Self {
        self.vault_root = root.into();
        self
    }

    pub fn with_outer_base_dir(mut self, dir: impl Into<String>) -> Self {
        self.outer_base_dir = dir.into();
        self
    }

    pub fn with_import_paths(mut self, table: ImportPathTable) -> Self {
        self.import_paths = table;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_latest_versions(mut self, latest: BTreeMap<String, String>) -> Self {
        self.latest_versions = latest;
        self
    }

    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = Some(version.into());
        self
    }
}
