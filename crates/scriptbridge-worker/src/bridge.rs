//! The host plugin: cache lookups, worker round trips, persistence and the
//! final transform of a user script.

use futures::future::try_join_all;
use scriptbridge_core::{
    extract_bare_imports, pkg::package_key, transform, vpath, Config, DiskFs, MaterializedPackage,
    PackageMaterializer, PackageSource, RegistryClient, ResolutionCache, TransformContext,
    TransformOutput, VirtualFs,
};
use scriptbridge_proto::{WorkerRequest, WorkerResponse};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::convert::{cached_library, materialized_package};
use crate::error::WorkerError;
use crate::host::WorkerHost;

/// What [`ScriptBridge::add_package`] settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedPackage {
    pub version: String,
    /// Dependencies as `name@version` keys.
    pub dependencies: Vec<String>,
}

/// Resolves a script's package imports and rewrites the script for the sandbox.
pub struct ScriptBridge {
    config: Config,
    vfs: Arc<dyn VirtualFs>,
    host: WorkerHost,
    cache: Mutex<ResolutionCache>,
}

impl ScriptBridge {
    /// Build a bridge over `vfs`, loading the persisted cache and starting a
    /// worker that fetches from `source`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: Config,
        vfs: Arc<dyn VirtualFs>,
        source: Arc<dyn PackageSource>,
    ) -> Result<Self, WorkerError> {
        let cache = ResolutionCache::load(vfs.as_ref(), &config.cache_file)?;
        debug!(
            cached = cache.downloaded_libraries.len(),
            cache_file = %config.cache_file,
            "loaded resolution cache"
        );
        let host = WorkerHost::spawn(source)?;
        Ok(Self {
            config,
            vfs,
            host,
            cache: Mutex::new(cache),
        })
    }

    /// A bridge over the vault on disk, fetching from the configured registry.
    pub fn from_config(config: Config) -> Result<Self, WorkerError> {
        let vfs = Arc::new(DiskFs::new(config.vault_root.clone()));
        let source = RegistryClient::new(&config.registry).map_err(scriptbridge_core::Error::from)?;
        Self::new(config, vfs, Arc::new(source))
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A copy of the current resolution cache.
    pub fn cache_snapshot(&self) -> ResolutionCache {
        self.cache().clone()
    }

    /// Resolve every package `source` imports, then rewrite it.
    ///
    /// Sources in the host configuration directory come back unchanged.
    pub async fn pre_transform(&self, path: &str, source: &str) -> Result<TransformOutput, WorkerError> {
        if self.config.is_config_path(path) {
            return Ok(TransformOutput {
                code: source.to_string(),
                diagnostics: Vec::new(),
            });
        }

        let vault_files = self.vault_files()?;
        let scan_ctx = TransformContext::new()
            .with_vault_root(self.vault_root())
            .with_vault_files(vault_files.iter().cloned());
        let imports = extract_bare_imports(source, path, &scan_ctx);
        debug!(%path, imports = imports.len(), "scanned imports");

        let added = try_join_all(
            imports
                .iter()
                .map(|import| self.add_package(&import.name, import.requested_version())),
        )
        .await?;
        let dependencies = imports
            .iter()
            .zip(added)
            .map(|(import, added)| package_key(&import.name, &added.version))
            .collect();

        let (import_paths, latest) = {
            let cache = self.cache();
            (cache.import_paths(), cache.latest_version_index.clone())
        };
        let mut ctx = TransformContext::new()
            .with_vault_root(self.vault_root())
            .with_vault_files(vault_files)
            .with_outer_base_dir(vpath::dirname(path))
            .with_import_paths(import_paths)
            .with_dependencies(dependencies)
            .with_latest_versions(latest);

        let output = transform(source, path, &mut ctx)?;
        for diagnostic in &output.diagnostics {
            debug!(%diagnostic, "transform diagnostic");
        }
        Ok(output)
    }

    /// Make `name@version` available in the vault.
    ///
    /// Served from the cache when it is materialized already, otherwise
    /// resolved by the worker and persisted.
    pub async fn add_package(&self, name: &str, version: &str) -> Result<AddedPackage, WorkerError> {
        if let Some(added) = self.cached(name, version) {
            debug!(package = %name, version = %added.version, "served from cache");
            return Ok(added);
        }

        let response = self.resolve(name, version).await?;
        let added = AddedPackage {
            version: response.resolved_version.clone(),
            dependencies: response
                .content
                .get(&response.root_key())
                .map(|root| root.dependencies.clone())
                .unwrap_or_default(),
        };
        self.persist(response)?;
        info!(package = %name, version = %added.version, "package added");
        Ok(added)
    }

    /// Ask the worker to resolve `name@version` without persisting anything.
    pub async fn resolve(&self, name: &str, version: &str) -> Result<WorkerResponse, WorkerError> {
        let (latest_version_index, cached_libraries) = {
            let cache = self.cache();
            let libraries: BTreeMap<_, _> = cache
                .downloaded_libraries
                .iter()
                .filter(|(_, entry)| !entry.files.is_empty())
                .map(|(key, entry)| (key.clone(), cached_library(entry)))
                .collect();
            (cache.latest_version_index.clone(), libraries)
        };

        self.host
            .request(WorkerRequest {
                correlation_id: 0,
                library_root_dir: self.config.library_dir.clone(),
                vault_root: self.vault_root(),
                vault_file_list: self.vault_files()?,
                latest_version_index,
                requested_version: version.to_string(),
                package_name: name.to_string(),
                cached_libraries,
            })
            .await
    }

    /// Stop the worker. Pending requests are rejected.
    pub fn shutdown(&self) {
        info!("shutting down");
        self.host.shutdown();
    }

    fn cached(&self, name: &str, version: &str) -> Option<AddedPackage> {
        let cache = self.cache();
        let (key, entry) = cache.cached_entry(name, version)?;
        let version = scriptbridge_core::pkg::split_package_key(&key)
            .map(|(_, version)| version.to_string())?;
        Some(AddedPackage {
            version,
            dependencies: entry.dependencies.clone(),
        })
    }

    /// Write a worker response into the vault and save the cache.
    fn persist(&self, response: WorkerResponse) -> Result<(), WorkerError> {
        let content: BTreeMap<String, MaterializedPackage> = response
            .content
            .into_iter()
            .map(|(key, package)| (key, materialized_package(package)))
            .collect();
        let materializer =
            PackageMaterializer::new(self.config.library_dir.clone()).with_vault_root(self.vault_root());

        let mut cache = self.cache();
        let report = materializer.persist(self.vfs.as_ref(), &content, &response.latest, &mut cache);
        for (path, error) in &report.failed {
            warn!(%path, %error, "failed to write file");
        }
        debug!(written = report.written.len(), "persisted package files");
        cache.save(self.vfs.as_ref(), &self.config.cache_file)?;
        Ok(())
    }

    fn vault_files(&self) -> Result<Vec<String>, WorkerError> {
        Ok(self
            .vfs
            .list_files()
            .map_err(scriptbridge_core::Error::from)?)
    }

    fn vault_root(&self) -> String {
        vpath::to_slash(&self.config.vault_root.to_string_lossy())
    }

    fn cache(&self) -> MutexGuard<'_, ResolutionCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mock_registry, MockRegistry};
    use scriptbridge_core::MemoryFs;
    use serde_json::json;
    use std::path::PathBuf;

    const LIBS: &str = ".obsidian/plugins/scriptbridge/libs";

    fn registry() -> Arc<MockRegistry> {
        let mut reg = mock_registry();
        reg.publish(
            "dayjs",
            "1.11.10",
            json!({ "name": "dayjs", "version": "1.11.10", "main": "dayjs.min.js" }),
            &[("dayjs.min.js", "module.exports = function dayjs() { return 0; };\n")],
        );
        reg.publish(
            "fmt",
            "2.0.0",
            json!({ "name": "fmt", "version": "2.0.0", "dependencies": { "dayjs": "^1.0.0" } }),
            &[("index.js", "import dayjs from \"dayjs\";\nexport const when = () => dayjs();\n")],
        );
        Arc::new(reg)
    }

    fn bridge(vfs: Arc<MemoryFs>, reg: Arc<MockRegistry>) -> ScriptBridge {
        let config = Config::new(PathBuf::from("/vault"));
        ScriptBridge::new(config, vfs, reg).unwrap()
    }

    #[tokio::test]
    async fn test_pre_transform_fetches_persists_and_rewrites() {
        let vfs = Arc::new(MemoryFs::new());
        let reg = registry();
        let bridge = bridge(Arc::clone(&vfs), Arc::clone(&reg));

        let source = "import { when } from \"fmt\";\nexport default () => when();\n";
        let out = bridge.pre_transform("scripts/today.js", source).await.unwrap();
        assert!(
            out.code
                .contains(&format!("await dc.require(\"{LIBS}/fmt@2.0.0/index.js\")")),
            "{}",
            out.code
        );
        assert!(!out.code.contains("import "), "{}", out.code);

        assert!(vfs.exists(&format!("{LIBS}/fmt@2.0.0/index.js")));
        assert!(vfs.exists(&format!("{LIBS}/dayjs@1.11.10/dayjs.min.js")));
        let saved = vfs
            .read_to_string(".obsidian/plugins/scriptbridge/data.json")
            .unwrap();
        assert!(saved.contains("fmt@2.0.0"));

        let cache = bridge.cache_snapshot();
        assert_eq!(cache.latest_version_index["fmt"], "2.0.0");
        assert_eq!(
            cache.downloaded_libraries["fmt@2.0.0"].dependencies,
            vec!["dayjs@1.11.10".to_string()]
        );

        // Everything is cached now
        bridge.pre_transform("scripts/today.js", source).await.unwrap();
        assert_eq!(reg.downloads_of("fmt"), 1);
        assert_eq!(reg.downloads_of("dayjs"), 1);
        bridge.shutdown();
    }

    #[tokio::test]
    async fn test_config_dir_sources_pass_through() {
        let bridge = bridge(Arc::new(MemoryFs::new()), registry());
        let source = "import x from \"fmt\";\n";
        let out = bridge
            .pre_transform(".obsidian/snippets/x.js", source)
            .await
            .unwrap();
        assert_eq!(out.code, source);
    }

    #[tokio::test]
    async fn test_add_package_uses_cache_second_time() {
        let reg = registry();
        let bridge = bridge(Arc::new(MemoryFs::new()), Arc::clone(&reg));

        let first = bridge.add_package("dayjs", "latest").await.unwrap();
        assert_eq!(first.version, "1.11.10");
        assert!(first.dependencies.is_empty());

        let second = bridge.add_package("dayjs", "latest").await.unwrap();
        assert_eq!(second, first);
        assert_eq!(reg.downloads_of("dayjs"), 1);
    }

    #[tokio::test]
    async fn test_unknown_package_fails() {
        let bridge = bridge(Arc::new(MemoryFs::new()), registry());
        let err = bridge.add_package("nope", "latest").await.unwrap_err();
        assert_eq!(err.code(), Some("PKG_NOT_FOUND"));

        let err = bridge
            .pre_transform("a.js", "import nope from \"nope\";\n")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("PKG_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_cached_libraries_skip_the_worker() {
        let reg = registry();
        let vfs = Arc::new(MemoryFs::new());
        {
            let bridge = bridge(Arc::clone(&vfs), Arc::clone(&reg));
            bridge.add_package("fmt", "2.0.0").await.unwrap();
        }

        let reopened = bridge(Arc::clone(&vfs), Arc::clone(&reg));
        let added = reopened.add_package("fmt", "latest").await.unwrap();
        assert_eq!(added.version, "2.0.0");
        assert_eq!(added.dependencies, vec!["dayjs@1.11.10".to_string()]);
        assert_eq!(reg.downloads_of("fmt"), 1);
    }
}
