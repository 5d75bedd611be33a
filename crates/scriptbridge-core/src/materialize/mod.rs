//! Package materialization.
//!
//! Turns a [`Resolution`] into transformed file contents (done inside the
//! worker) and persists those contents into the vault plus the resolution
//! cache (done by the host).

mod cache;

pub use cache::{CacheEntry, ResolutionCache};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::pkg::{split_package_key, PackageVersionRecord, Resolution, VirtualFile};
use crate::transform::{
    transform, Diagnostic, ImportPathEntry, ImportPathTable, TransformContext, TransformError,
};
use crate::vfs::VirtualFs;
use crate::vpath;

/// First-line pragma of Flow sources, which the parser does not handle.
const FLOW_PRAGMA: &str = "@flow";

/// One transformed file, relative to its package directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedFile {
    pub path: String,
    pub transformed_text: String,
}

/// A package's transformed files and metadata, ready to be persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedPackage {
    pub entry_point: String,
    pub latest_version: String,
    pub base_dir: String,
    pub dependencies: Vec<String>,
    pub files: Vec<MaterializedFile>,
}

impl MaterializedPackage {
    /// The cache entry describing this package once its files are written.
    #[must_use]
    pub fn cache_entry(&self, written: Vec<String>) -> CacheEntry {
        CacheEntry {
            base_dir: self.base_dir.clone(),
            files: written,
            entry_point: self.entry_point.clone(),
            dependencies: self.dependencies.clone(),
            latest: self.latest_version.clone(),
        }
    }
}

/// Why a package file was left out.
#[derive(Debug, Clone)]
pub enum SkipReason {
    /// Flow-annotated source.
    Flow,
    /// The file could not be parsed or printed.
    Transform(TransformError),
}

/// A package file that was not materialized.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub package: String,
    pub path: String,
    pub reason: SkipReason,
}

/// The result of transforming every file of a resolution.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    /// Transformed packages keyed by `name@version`.
    pub content: BTreeMap<String, MaterializedPackage>,
    pub skipped: Vec<SkippedFile>,
    /// Non-fatal transform findings, each tagged with its file.
    pub diagnostics: Vec<Diagnostic>,
}

/// What [`PackageMaterializer::persist`] wrote.
#[derive(Debug, Clone, Default)]
pub struct PersistReport {
    /// Vault-relative paths written.
    pub written: Vec<String>,
    /// Paths that failed to write, with the error message.
    pub failed: Vec<(String, String)>,
}

impl PersistReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Transforms resolved packages and writes them under the library directory.
#[derive(Debug, Clone)]
pub struct PackageMaterializer {
    library_dir: String,
    vault_root: String,
    vault_files: BTreeSet<String>,
}

impl PackageMaterializer {
    /// Materialize into the vault-relative `library_dir`.
    #[must_use]
    pub fn new(library_dir: impl Into<String>) -> Self {
        Self {
            library_dir: vpath::normalize(&library_dir.into()),
            vault_root: String::new(),
            vault_files: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_vault_root(mut self, root: impl Into<String>) -> Self {
        self.vault_root = root.into();
        self
    }

    #[must_use]
    pub fn with_vault_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vault_files = files.into_iter().map(Into::into).collect();
        self
    }

    /// `<library_dir>/<name@version>`
    #[must_use]
    pub fn base_dir(&self, key: &str) -> String {
        vpath::join(&self.library_dir, key)
    }

    /// Import table over the already cached packages and those resolved now.
    ///
    /// A freshly resolved package replaces a cached entry with the same key.
    #[must_use]
    pub fn import_paths(
        &self,
        resolution: &Resolution,
        cached: &BTreeMap<String, CacheEntry>,
    ) -> ImportPathTable {
        let mut table: ImportPathTable = cached
            .iter()
            .map(|(key, entry)| (key.clone(), entry.import_path()))
            .collect();
        for (key, record) in &resolution.packages {
            let base_dir = self.base_dir(key);
            let files = record
                .files
                .iter()
                .filter(|file| is_transformable(file))
                .map(|file| vpath::join(&base_dir, &file.path))
                .collect();
            table.insert(
                key.clone(),
                ImportPathEntry {
                    base_dir,
                    files,
                    entry_point: record.entry_point.clone(),
                },
            );
        }
        table
    }

    /// Transform every file of every package in `resolution`.
    ///
    /// Files that fail to parse are skipped and reported; nothing here is fatal.
    #[must_use]
    pub fn build_content(
        &self,
        resolution: &Resolution,
        cached: &BTreeMap<String, CacheEntry>,
    ) -> BuildOutput {
        let mut ctx = TransformContext::new()
            .with_vault_root(self.vault_root.clone())
            .with_import_paths(self.import_paths(resolution, cached))
            .with_latest_versions(resolution.latest.clone());
        ctx.vault_files.clone_from(&self.vault_files);

        let mut output = BuildOutput::default();
        for (key, record) in &resolution.packages {
            let package = self.build_package(key, record, &mut ctx, &mut output);
            output.content.insert(key.clone(), package);
        }
        output
    }

    fn build_package(
        &self,
        key: &str,
        record: &PackageVersionRecord,
        ctx: &mut TransformContext,
        output: &mut BuildOutput,
    ) -> MaterializedPackage {
        let base_dir = self.base_dir(key);
        ctx.outer_base_dir.clone_from(&base_dir);
        ctx.dependencies.clone_from(&record.dependencies);
        ctx.current_version = Some(record.version.clone());

        let mut files = Vec::new();
        for file in record.files.iter().filter(|file| is_transformable(file)) {
            let text = file.text();
            if is_flow(&text) {
                output.skipped.push(SkippedFile {
                    package: key.to_string(),
                    path: file.path.clone(),
                    reason: SkipReason::Flow,
                });
                continue;
            }

            let file_path = vpath::join(&base_dir, &file.path);
            match transform(&text, &file_path, ctx) {
                Ok(result) => {
                    output.diagnostics.extend(result.diagnostics);
                    files.push(MaterializedFile {
                        path: file.path.clone(),
                        transformed_text: result.code,
                    });
                }
                Err(err) => output.skipped.push(SkippedFile {
                    package: key.to_string(),
                    path: file.path.clone(),
                    reason: SkipReason::Transform(err),
                }),
            }
        }

        MaterializedPackage {
            entry_point: record.entry_point.clone(),
            latest_version: record.latest.clone(),
            base_dir,
            dependencies: record.dependencies.clone(),
            files,
        }
    }

    /// Write transformed packages into the vault and record them in `cache`.
    ///
    /// Existing files are overwritten. A failed write is reported and leaves
    /// the file out of the package's cache entry; other files continue.
    pub fn persist(
        &self,
        vfs: &dyn VirtualFs,
        content: &BTreeMap<String, MaterializedPackage>,
        latest: &BTreeMap<String, String>,
        cache: &mut ResolutionCache,
    ) -> PersistReport {
        let mut report = PersistReport::default();

        for (key, package) in content {
            let base_dir = if package.base_dir.is_empty() {
                self.base_dir(key)
            } else {
                package.base_dir.clone()
            };

            let mut written = Vec::with_capacity(package.files.len());
            for file in &package.files {
                let path = vpath::join(&base_dir, &file.path);
                let result = vfs
                    .create_dir_all(vpath::dirname(&path))
                    .and_then(|()| vfs.write(&path, &file.transformed_text));
                match result {
                    Ok(()) => written.push(path),
                    Err(e) => report.failed.push((path, e.to_string())),
                }
            }

            report.written.extend(written.iter().cloned());
            let mut entry = package.cache_entry(written);
            entry.base_dir = base_dir;
            cache.insert(key.clone(), entry);
            if let Some((name, _)) = split_package_key(key) {
                cache.set_latest(name, package.latest_version.clone());
            }
        }

        for (name, version) in latest {
            cache.set_latest(name.clone(), version.clone());
        }
        report
    }
}

fn is_transformable(file: &VirtualFile) -> bool {
    vpath::extname(&file.path) != ".json"
}

fn is_flow(text: &str) -> bool {
    text.lines().next().is_some_and(|line| line.contains(FLOW_PRAGMA))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::RootEntry;
    use crate::vfs::MemoryFs;

    const LIBS: &str = ".obsidian/plugins/scriptbridge/libs";

    fn record(name: &str, version: &str, files: &[(&str, &str)], deps: &[&str]) -> PackageVersionRecord {
        PackageVersionRecord {
            name: name.to_string(),
            version: version.to_string(),
            entry_point: "index.js".to_string(),
            files: files
                .iter()
                .map(|(path, text)| VirtualFile::new(*path, text.as_bytes().to_vec()))
                .collect(),
            dependencies: deps.iter().map(ToString::to_string).collect(),
            latest: version.to_string(),
        }
    }

    fn resolution(records: Vec<PackageVersionRecord>) -> Resolution {
        let root = &records[0];
        Resolution {
            root: RootEntry {
                name: root.name.clone(),
                version: root.version.clone(),
                entry_point: root.entry_point.clone(),
            },
            latest: records
                .iter()
                .map(|r| (r.name.clone(), r.version.clone()))
                .collect(),
            packages: records.into_iter().map(|r| (r.key(), r)).collect(),
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_build_content_transforms_and_links_dependencies() {
        let res = resolution(vec![
            record(
                "app",
                "1.0.0",
                &[("index.js", "import dep from \"dep\";\nexport default dep;\n")],
                &["dep@2.0.0"],
            ),
            record("dep", "2.0.0", &[("index.js", "module.exports = 42;\n")], &[]),
        ]);
        let out = PackageMaterializer::new(LIBS).build_content(&res, &BTreeMap::new());

        assert!(out.skipped.is_empty());
        let app = &out.content["app@1.0.0"];
        assert_eq!(app.base_dir, format!("{LIBS}/app@1.0.0"));
        assert_eq!(app.dependencies, vec!["dep@2.0.0".to_string()]);
        assert!(app.files[0]
            .transformed_text
            .contains(&format!("await dc.require(\"{LIBS}/dep@2.0.0/index.js\")")));
        assert!(out.content["dep@2.0.0"].files[0]
            .transformed_text
            .contains("return 42;"));
    }

    #[test]
    fn test_cached_packages_are_visible_to_the_transform() {
        let res = resolution(vec![record(
            "app",
            "1.0.0",
            &[("index.js", "import old from \"old\";\n")],
            &["old@0.1.0"],
        )]);
        let cached = BTreeMap::from([(
            "old@0.1.0".to_string(),
            CacheEntry {
                base_dir: format!("{LIBS}/old@0.1.0"),
                files: vec![format!("{LIBS}/old@0.1.0/main.js")],
                entry_point: "main.js".to_string(),
                dependencies: Vec::new(),
                latest: "0.1.0".to_string(),
            },
        )]);
        let out = PackageMaterializer::new(LIBS).build_content(&res, &cached);
        assert!(out.content["app@1.0.0"].files[0]
            .transformed_text
            .contains("old@0.1.0/main.js"));
    }

    #[test]
    fn test_flow_json_and_broken_files_are_skipped() {
        let res = resolution(vec![record(
            "app",
            "1.0.0",
            &[
                ("index.js", "export const ok = 1;\n"),
                ("flow.js", "// @flow\nexport type T = number;\n"),
                ("broken.js", "export default (\n"),
                ("package.json", "{}"),
            ],
            &[],
        )]);
        let out = PackageMaterializer::new(LIBS).build_content(&res, &BTreeMap::new());
        let app = &out.content["app@1.0.0"];
        assert_eq!(app.files.len(), 1);
        assert_eq!(app.files[0].path, "index.js");
        assert_eq!(out.skipped.len(), 2);
        assert!(out
            .skipped
            .iter()
            .any(|s| s.path == "flow.js" && matches!(s.reason, SkipReason::Flow)));
        assert!(out
            .skipped
            .iter()
            .any(|s| s.path == "broken.js" && matches!(s.reason, SkipReason::Transform(_))));
    }

    #[test]
    fn test_persist_writes_files_and_cache() {
        let vfs = MemoryFs::new().with_file(&format!("{LIBS}/a@1.0.0/index.js"), "stale");
        let content = BTreeMap::from([(
            "a@1.0.0".to_string(),
            MaterializedPackage {
                entry_point: "index.js".to_string(),
                latest_version: "1.2.0".to_string(),
                base_dir: format!("{LIBS}/a@1.0.0"),
                dependencies: vec!["b@1.0.0".to_string()],
                files: vec![
                    MaterializedFile {
                        path: "index.js".to_string(),
                        transformed_text: "return 1;".to_string(),
                    },
                    MaterializedFile {
                        path: "lib/util.js".to_string(),
                        transformed_text: "return 2;".to_string(),
                    },
                ],
            },
        )]);
        let latest = BTreeMap::from([("b".to_string(), "1.0.0".to_string())]);
        let mut cache = ResolutionCache::new();

        let report = PackageMaterializer::new(LIBS).persist(&vfs, &content, &latest, &mut cache);

        assert!(report.is_clean());
        assert_eq!(report.written.len(), 2);
        assert_eq!(
            vfs.read_to_string(&format!("{LIBS}/a@1.0.0/index.js")).unwrap(),
            "return 1;"
        );
        let entry = &cache.downloaded_libraries["a@1.0.0"];
        assert_eq!(entry.files.len(), 2);
        assert_eq!(entry.latest, "1.2.0");
        assert_eq!(cache.latest_version_index["a"], "1.2.0");
        assert_eq!(cache.latest_version_index["b"], "1.0.0");
        assert!(cache.is_cached("a", "1.0.0"));
    }
}
