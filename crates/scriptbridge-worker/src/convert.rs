//! Mapping between core types and their wire shapes.

use scriptbridge_core::{CacheEntry, MaterializedFile, MaterializedPackage};
use scriptbridge_proto::{CachedLibrary, PackageContent, TransformedFile};

pub(crate) fn cached_library(entry: &CacheEntry) -> CachedLibrary {
    CachedLibrary {
        base_dir: entry.base_dir.clone(),
        files: entry.files.clone(),
        entry_point: entry.entry_point.clone(),
        dependencies: entry.dependencies.clone(),
        latest: entry.latest.clone(),
    }
}

pub(crate) fn cache_entry(library: &CachedLibrary) -> CacheEntry {
    CacheEntry {
        base_dir: library.base_dir.clone(),
        files: library.files.clone(),
        entry_point: library.entry_point.clone(),
        dependencies: library.dependencies.clone(),
        latest: library.latest.clone(),
    }
}

pub(crate) fn package_content(package: MaterializedPackage) -> PackageContent {
    PackageContent {
        entry_point: package.entry_point,
        latest_version: package.latest_version,
        base_dir: package.base_dir,
        dependencies: package.dependencies,
        files: package
            .files
            .into_iter()
            .map(|file| TransformedFile {
                path: file.path,
                transformed_text: file.transformed_text,
            })
            .collect(),
    }
}

pub(crate) fn materialized_package(content: PackageContent) -> MaterializedPackage {
    MaterializedPackage {
        entry_point: content.entry_point,
        latest_version: content.latest_version,
        base_dir: content.base_dir,
        dependencies: content.dependencies,
        files: content
            .files
            .into_iter()
            .map(|file| MaterializedFile {
                path: file.path,
                transformed_text: file.transformed_text,
            })
            .collect(),
    }
}
