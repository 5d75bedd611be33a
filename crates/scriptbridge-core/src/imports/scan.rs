//! Top-level bare import extraction.

use std::collections::HashSet;
use swc_ecma_ast::{ModuleDecl, ModuleItem};

use crate::pkg::{is_bare_specifier, PackageSpec};
use crate::resolver::{has_private_marker, is_vault_local};
use crate::transform::parse::parse_module;
use crate::transform::shims::{is_internal_namespace, runtime_shim};
use crate::transform::TransformContext;

/// Import kind constants.
pub mod kinds {
    /// `import ... from "x"` or `import "x"`.
    pub const ESM_IMPORT: &str = "esm_import";
    /// `export ... from "x"`.
    pub const ESM_EXPORT: &str = "esm_export";
}

/// A package a file imports at module level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BareImport {
    /// Specifier exactly as written.
    pub raw: String,
    /// Package name without version or sub-path.
    pub name: String,
    /// Version pinned in the specifier, if any.
    pub version: Option<String>,
    /// One of the [`kinds`] constants.
    pub kind: &'static str,
    /// 1-indexed line of the declaration.
    pub line: u32,
}

impl BareImport {
    /// The version to request: the pin, or `latest`.
    #[must_use]
    pub fn requested_version(&self) -> &str {
        self.version.as_deref().unwrap_or(crate::pkg::LATEST)
    }
}

/// Extract the bare package imports of `source`.
///
/// Only import declarations and `export ... from` re-exports are considered;
/// `require()` calls and type-only imports are not. Runtime shims, the
/// internal namespace, relative and absolute paths, vault-local files and
/// specifiers with a private marker are skipped. Results are in first
/// appearance order, one per package name and version.
///
/// A file that does not parse yields nothing; the transform reports the error.
#[must_use]
pub fn extract_bare_imports(
    source: &str,
    file_path: &str,
    ctx: &TransformContext,
) -> Vec<BareImport> {
    let Ok(parsed) = parse_module(source, file_path) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for item in &parsed.module.body {
        let ModuleItem::ModuleDecl(decl) = item else {
            continue;
        };
        let (src, kind) = match decl {
            ModuleDecl::Import(import) if !import.type_only => (&import.src, kinds::ESM_IMPORT),
            ModuleDecl::ExportNamed(named) if !named.type_only => match &named.src {
                Some(src) => (src, kinds::ESM_EXPORT),
                None => continue,
            },
            ModuleDecl::ExportAll(all) if !all.type_only => (&all.src, kinds::ESM_EXPORT),
            _ => continue,
        };

        let raw = src.value.to_string();
        if !wants_package(&raw, ctx) {
            continue;
        }
        let Ok(spec) = PackageSpec::parse(&raw) else {
            continue;
        };
        if !seen.insert((spec.name.clone(), spec.version.clone())) {
            continue;
        }
        let line = parsed.cm.lookup_char_pos(src.span.lo).line;
        results.push(BareImport {
            raw,
            name: spec.name,
            version: spec.version,
            kind,
            line: u32::try_from(line).unwrap_or(u32::MAX),
        });
    }
    results
}

fn wants_package(spec: &str, ctx: &TransformContext) -> bool {
    is_bare_specifier(spec)
        && runtime_shim(spec).is_none()
        && !is_internal_namespace(spec)
        && !has_private_marker(spec)
        && !is_vault_local(spec, ctx)
}
