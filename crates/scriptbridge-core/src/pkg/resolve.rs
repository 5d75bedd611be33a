//! Dependency graph resolution.
//!
//! Walks the registry breadth-first from a root package, fetching and
//! unpacking every distinct `name@version` exactly once. Each visited package
//! becomes a [`PackageVersionRecord`] holding its public file set.

use super::error::PkgError;
use super::files::derive_file_set;
use super::manifest::PackageManifest;
use super::registry::{get_latest_version, get_tarball_url, PackageSource};
use super::spec::package_key;
use super::tarball::{extract_tgz_entries, VirtualFile};
use super::version::{resolve_version, strip_range_operators, version_satisfies};
use crate::transform::shims::is_runtime_shim;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

/// One resolved package version and its public files.
#[derive(Debug, Clone)]
pub struct PackageVersionRecord {
    pub name: String,
    pub version: String,
    pub entry_point: String,
    pub files: Vec<VirtualFile>,
    /// Dependencies as `name@version` keys.
    pub dependencies: Vec<String>,
    /// The registry's latest version of this package when it was resolved.
    pub latest: String,
}

impl PackageVersionRecord {
    /// The `name@version` key this record is stored under.
    #[must_use]
    pub fn key(&self) -> String {
        package_key(&self.name, &self.version)
    }
}

/// The root of a resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootEntry {
    pub name: String,
    pub version: String,
    pub entry_point: String,
}

/// A dependency branch that was abandoned during the walk.
#[derive(Debug, Clone)]
pub struct BranchFailure {
    pub name: String,
    pub spec: String,
    pub error: PkgError,
}

/// The result of one resolution pass.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub root: RootEntry,
    /// Every package visited in this pass, keyed by `name@version`.
    pub packages: BTreeMap<String, PackageVersionRecord>,
    /// Latest known version per package name, including the index the pass started from.
    pub latest: BTreeMap<String, String>,
    /// Branches skipped because of network or manifest failures.
    pub failures: Vec<BranchFailure>,
}

/// A queued `(name, version spec)` pair.
type QueueEntry = (String, String);

/// A visited package whose dependency keys are not final yet.
struct PendingRecord {
    name: String,
    version: String,
    entry_point: String,
    files: Vec<VirtualFile>,
    deps: Vec<QueueEntry>,
}

/// Mutable state of one walk.
#[derive(Default)]
struct Walk {
    packuments: HashMap<String, Arc<Value>>,
    records: BTreeMap<String, PendingRecord>,
    /// What each processed `(name, spec)` pair resolved to.
    settled: HashMap<QueueEntry, String>,
    latest: BTreeMap<String, String>,
    failures: Vec<BranchFailure>,
}

/// Breadth-first dependency resolver over a [`PackageSource`].
pub struct DependencyResolver<'a> {
    source: &'a dyn PackageSource,
    cached: BTreeSet<String>,
}

impl<'a> DependencyResolver<'a> {
    #[must_use]
    pub fn new(source: &'a dyn PackageSource) -> Self {
        Self {
            source,
            cached: BTreeSet::new(),
        }
    }

    /// Package keys already materialized; dependencies resolving to them are not fetched.
    #[must_use]
    pub fn with_cached<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.cached.extend(keys);
        self
    }

    /// Resolve the graph rooted at `name@version`.
    ///
    /// `version` may be `latest`, an exact version or a range. `latest_index`
    /// seeds the latest-version knowledge used for peer dependency aliasing.
    ///
    /// # Errors
    /// Fails only if the root package itself cannot be fetched, unpacked or
    /// read. Failures below the root are collected in [`Resolution::failures`].
    pub async fn resolve(
        &self,
        name: &str,
        version: &str,
        latest_index: &BTreeMap<String, String>,
    ) -> Result<Resolution, PkgError> {
        let mut walk = Walk {
            latest: latest_index.clone(),
            ..Walk::default()
        };
        let mut queue: VecDeque<QueueEntry> = VecDeque::new();
        queue.push_back((name.to_string(), version.to_string()));
        let mut root: Option<RootEntry> = None;

        while let Some((dep_name, spec)) = queue.pop_front() {
            let is_root = root.is_none();
            if walk.settled.contains_key(&(dep_name.clone(), spec.clone())) {
                continue;
            }

            match self.visit(&dep_name, &spec, is_root, &mut walk).await {
                Ok(Some(record)) => {
                    if is_root {
                        root = Some(RootEntry {
                            name: record.name.clone(),
                            version: record.version.clone(),
                            entry_point: record.entry_point.clone(),
                        });
                    }
                    queue.extend(record.deps.iter().cloned());
                    walk.records
                        .insert(package_key(&record.name, &record.version), record);
                }
                Ok(None) => {}
                Err(error) if is_root => return Err(error),
                Err(error) => walk.failures.push(BranchFailure {
                    name: dep_name,
                    spec,
                    error,
                }),
            }
        }

        let root = root.ok_or_else(|| PkgError::not_found(name))?;
        Ok(walk.finish(root))
    }

    /// Process one queue entry. Returns `None` when it names a version that
    /// was already visited or is cached.
    async fn visit(
        &self,
        name: &str,
        spec: &str,
        is_root: bool,
        walk: &mut Walk,
    ) -> Result<Option<PendingRecord>, PkgError> {
        // An exact version already known needs no registry round trip
        let exact = package_key(name, spec);
        if !is_root && (walk.records.contains_key(&exact) || self.cached.contains(&exact)) {
            walk.settled
                .insert((name.to_string(), spec.to_string()), spec.to_string());
            return Ok(None);
        }

        let packument = walk.packument(self.source, name).await?;
        if let Some(latest) = get_latest_version(&packument) {
            walk.latest.insert(name.to_string(), latest.to_string());
        }

        let version = resolve_version(&packument, spec)?;
        walk.settled
            .insert((name.to_string(), spec.to_string()), version.clone());

        let key = package_key(name, &version);
        if walk.records.contains_key(&key) || (!is_root && self.cached.contains(&key)) {
            return Ok(None);
        }

        let url = get_tarball_url(&packument, &version)
            .ok_or_else(|| PkgError::download_failed(format!("{key} has no tarball URL")))?;
        let bytes = self.source.tarball(url).await?;
        let archive = extract_tgz_entries(&bytes)?;
        let manifest = PackageManifest::from_files(&key, &archive)?;

        Ok(Some(PendingRecord {
            name: name.to_string(),
            entry_point: manifest.entry_point(),
            files: derive_file_set(&manifest, &archive),
            deps: dependency_queue(&manifest, &walk.latest),
            version,
        }))
    }
}

/// Queue entries for a manifest's regular and peer dependencies.
///
/// A peer dependency whose range the latest known version satisfies is
/// pinned to that version so it shares one record with everyone else.
/// Runtime-shimmed UI libraries are never installed as peers.
fn dependency_queue(
    manifest: &PackageManifest,
    latest: &BTreeMap<String, String>,
) -> Vec<QueueEntry> {
    let mut deps: Vec<QueueEntry> = manifest
        .dependency_ranges()
        .map(|(name, range)| (name.to_string(), strip_range_operators(range)))
        .collect();

    for (name, range) in manifest.peer_dependency_ranges() {
        if is_runtime_shim(name) {
            continue;
        }
        let spec = match latest.get(name) {
            Some(latest) if version_satisfies(range, latest) => latest.clone(),
            _ => strip_range_operators(range),
        };
        deps.push((name.to_string(), spec));
    }

    deps
}

impl Walk {
    /// Fetch a packument once per pass.
    async fn packument(
        &mut self,
        source: &dyn PackageSource,
        name: &str,
    ) -> Result<Arc<Value>, PkgError> {
        if let Some(cached) = self.packuments.get(name) {
            return Ok(Arc::clone(cached));
        }
        let packument = Arc::new(source.packument(name).await?);
        self.packuments
            .insert(name.to_string(), Arc::clone(&packument));
        Ok(packument)
    }

    /// Turn pending records into final ones, pointing dependencies at the
    /// exact versions the walk settled on.
    fn finish(self, root: RootEntry) -> Resolution {
        let Walk {
            records,
            settled,
            latest,
            failures,
            ..
        } = self;

        let packages = records
            .into_iter()
            .map(|(key, pending)| {
                let dependencies = pending
                    .deps
                    .iter()
                    .map(|(name, spec)| {
                        let version = settled.get(&(name.clone(), spec.clone())).unwrap_or(spec);
                        package_key(name, version)
                    })
                    .collect();
                let record = PackageVersionRecord {
                    latest: latest
                        .get(&pending.name)
                        .cloned()
                        .unwrap_or_else(|| pending.version.clone()),
                    name: pending.name,
                    version: pending.version,
                    entry_point: pending.entry_point,
                    files: pending.files,
                    dependencies,
                };
                (key, record)
            })
            .collect();

        Resolution {
            root,
            packages,
            latest,
            failures,
        }
    }
}
