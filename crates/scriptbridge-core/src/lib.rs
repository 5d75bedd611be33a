#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod imports;
pub mod materialize;
pub mod pkg;
pub mod resolver;
pub mod transform;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod version;
pub mod vfs;
pub mod vpath;

pub use config::Config;
pub use error::Error;
pub use imports::{extract_bare_imports, BareImport};
pub use materialize::{
    BuildOutput, CacheEntry, MaterializedFile, MaterializedPackage, PackageMaterializer,
    PersistReport, ResolutionCache,
};
pub use pkg::{
    DependencyResolver, PackageSource, PackageVersionRecord, PkgError, RegistryClient,
    Resolution, VirtualFile,
};
pub use resolver::{resolve_path, ResolvedPath};
pub use transform::{
    transform, Diagnostic, ImportPathEntry, ImportPathTable, TransformContext, TransformError,
    TransformOutput,
};
pub use version::VERSION;
pub use vfs::{DiskFs, MemoryFs, VirtualFs};
