//! `scriptbridge cache` command implementation.

use miette::{IntoDiagnostic, Result};
use scriptbridge_core::pkg::split_package_key;
use scriptbridge_core::{Config, DiskFs, ResolutionCache};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct CachedPackageInfo {
    key: String,
    base_dir: String,
    entry_point: String,
    files: usize,
    dependencies: Vec<String>,
    /// Whether the latest-version index points at this version.
    latest: bool,
}

/// Cache list result for JSON output.
#[derive(Serialize)]
struct CacheListResult {
    ok: bool,
    packages: Vec<CachedPackageInfo>,
    latest: BTreeMap<String, String>,
}

pub fn list(config: &Config, json: bool) -> Result<()> {
    let vfs = DiskFs::new(config.vault_root.clone());
    let cache = ResolutionCache::load(&vfs, &config.cache_file).into_diagnostic()?;

    let packages: Vec<CachedPackageInfo> = cache
        .downloaded_libraries
        .iter()
        .map(|(key, entry)| CachedPackageInfo {
            key: key.clone(),
            base_dir: entry.base_dir.clone(),
            entry_point: entry.entry_point.clone(),
            files: entry.files.len(),
            dependencies: entry.dependencies.clone(),
            latest: split_package_key(key).is_some_and(|(name, version)| {
                cache.latest_version_index.get(name).map(String::as_str) == Some(version)
            }),
        })
        .collect();

    if json {
        return super::print_json(&CacheListResult {
            ok: true,
            packages,
            latest: cache.latest_version_index.clone(),
        });
    }

    if packages.is_empty() {
        println!("no cached packages");
        return Ok(());
    }
    for package in &packages {
        let marker = if package.latest { " (latest)" } else { "" };
        println!("{}{marker}  {} files", package.key, package.files);
    }
    Ok(())
}
