//! Package graph resolution.
//!
//! Provides utilities for:
//! - Parsing bare specifiers (name, `@version` pin, sub-path)
//! - Fetching package metadata and tarballs from the npm registry
//! - Resolving version specs and ranges using semver
//! - Reading package manifests and deriving each package's public file set
//! - Walking the dependency graph breadth-first, one record per exact version

pub mod error;
pub mod files;
pub mod manifest;
pub mod registry;
pub mod resolve;
pub mod spec;
pub mod tarball;
pub mod version;

pub use error::{codes as pkg_codes, PkgError};
pub use files::{derive_file_set, FileSetStrategy, SOURCE_EXTENSIONS};
pub use manifest::{ExportsMap, PackageManifest};
pub use registry::{PackageSource, RegistryClient, DEFAULT_REGISTRY, REGISTRY_ENV};
pub use resolve::{BranchFailure, DependencyResolver, PackageVersionRecord, Resolution, RootEntry};
pub use spec::{is_bare_specifier, package_key, split_package_key, PackageSpec};
pub use tarball::{extract_tgz_entries, extract_tgz_entries_limited, VirtualFile};
pub use version::{resolve_version, strip_range_operators, version_satisfies, LATEST};
