//! Specifier path resolution.
//!
//! Maps an import specifier to a vault-relative file using only the
//! [`TransformContext`]: the vault's own files and the installed packages'
//! import table. Resolution is a pure query; the context is never modified.

use crate::pkg::{package_key, split_package_key, PackageSpec};
use crate::transform::{ImportPathEntry, TransformContext};
use crate::vpath;

/// Extensions tried, in order, when a specifier has none.
pub const RESOLVE_EXTENSIONS: &[&str] = &[".js", ".jsx", ".ts", ".tsx", ".mjs", ".d.ts"];

/// Characters marking a specifier as private to the sandbox.
const PRIVATE_MARKERS: &[char] = &['#', '^'];

/// Paths containing this are CommonJS builds, avoided when an alternative exists.
const CJS_MARKER: &str = "cjs";

/// Outcome of resolving a specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum ResolvedPath {
    /// A vault-relative file path.
    File(String),
    Unresolved,
}

impl ResolvedPath {
    #[must_use]
    pub fn as_path(&self) -> Option<&str> {
        match self {
            Self::File(path) => Some(path),
            Self::Unresolved => None,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

/// Resolve `spec` as imported from `origin` (a vault-relative or absolute path).
///
/// Runtime shims and the internal namespace never reach this function.
pub fn resolve_path(spec: &str, ctx: &TransformContext, origin: Option<&str>) -> ResolvedPath {
    if is_vault_local(spec, ctx) || has_private_marker(spec) {
        return ResolvedPath::File(spec.to_string());
    }
    if is_relative(spec) {
        resolve_relative(spec, ctx, origin)
    } else {
        resolve_bare(spec, ctx)
    }
}

/// Whether `spec` names one of the vault's own files, with or without extension.
#[must_use]
pub fn is_vault_local(spec: &str, ctx: &TransformContext) -> bool {
    ctx.vault_files.contains(spec)
        || RESOLVE_EXTENSIONS
            .iter()
            .any(|ext| ctx.vault_files.contains(&format!("{spec}{ext}")))
}

#[must_use]
pub fn has_private_marker(spec: &str) -> bool {
    spec.contains(PRIVATE_MARKERS)
}

fn is_relative(spec: &str) -> bool {
    spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../")
}

fn has_source_extension(path: &str) -> bool {
    RESOLVE_EXTENSIONS.contains(&vpath::extname(path))
}

/// Make an absolute origin path vault-relative.
fn vault_relative(origin: &str, ctx: &TransformContext) -> String {
    let origin = vpath::to_slash(origin);
    let root = vpath::to_slash(&ctx.vault_root);
    match vpath::strip_dir(&origin, root.trim_end_matches('/')) {
        Some(rel) if !root.is_empty() => rel.to_string(),
        _ => origin.trim_start_matches('/').to_string(),
    }
}

fn resolve_relative(spec: &str, ctx: &TransformContext, origin: Option<&str>) -> ResolvedPath {
    let origin_dir = match origin {
        Some(origin) => vpath::dirname(&vault_relative(origin, ctx)).to_string(),
        None => ctx.outer_base_dir.clone(),
    };
    let target = vpath::join(&origin_dir, spec);

    if has_source_extension(&target) {
        return ResolvedPath::File(target);
    }

    let found = match owning_package(&target, ctx) {
        Some(entry) => match_candidate(&target, entry.files.iter().map(String::as_str)),
        None => match_candidate(&target, ctx.vault_files.iter().map(String::as_str)),
    };
    found.map_or(ResolvedPath::Unresolved, ResolvedPath::File)
}

/// Find the installed package whose directory holds `target`.
///
/// Package directories sit at no fixed depth and scoped names span two
/// segments, so every 1- and 2-segment window of the directory path is
/// tested against the import table keys.
fn owning_package<'a>(target: &str, ctx: &'a TransformContext) -> Option<&'a ImportPathEntry> {
    let segments: Vec<&str> = vpath::dirname(target)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    for start in 0..segments.len() {
        for width in 1..=2 {
            let Some(window) = segments.get(start..start + width) else {
                break;
            };
            if let Some(entry) = ctx.import_paths.get(&window.join("/")) {
                return Some(entry);
            }
        }
    }
    None
}

/// Match an extensionless `target` against known files: the path itself,
/// then `target<ext>`, then `target/index<ext>`.
fn match_candidate<'a, I>(target: &str, files: I) -> Option<String>
where
    I: Iterator<Item = &'a str> + Clone,
{
    let declaration_target = target.ends_with(".d");
    let mut candidates = vec![target.to_string()];
    for ext in RESOLVE_EXTENSIONS {
        if *ext == ".d.ts" && !declaration_target {
            continue;
        }
        candidates.push(format!("{target}{ext}"));
    }
    for ext in RESOLVE_EXTENSIONS.iter().filter(|ext| **ext != ".d.ts") {
        candidates.push(format!("{target}/index{ext}"));
    }

    candidates
        .into_iter()
        .find(|candidate| files.clone().any(|f| f == candidate))
}

fn resolve_bare(spec: &str, ctx: &TransformContext) -> ResolvedPath {
    let Ok(parsed) = PackageSpec::parse(spec) else {
        return ResolvedPath::Unresolved;
    };
    let Some(entry) = package_entry(&parsed, ctx) else {
        return ResolvedPath::Unresolved;
    };

    parsed
        .subpath
        .as_deref()
        .and_then(|sub| match_subpath(sub, entry))
        .or_else(|| entry_file(entry))
        .or_else(|| index_file(entry))
        .map_or(ResolvedPath::Unresolved, ResolvedPath::File)
}

/// Pick the installed version: explicit pin, the current package version,
/// a dependency alias, then the latest-version index.
fn package_entry<'a>(parsed: &PackageSpec, ctx: &'a TransformContext) -> Option<&'a ImportPathEntry> {
    let name = parsed.name.as_str();
    let alias = ctx
        .dependencies
        .iter()
        .find(|dep| split_package_key(dep).is_some_and(|(dep_name, _)| dep_name == name))
        .cloned();

    let keys = [
        parsed.version.as_deref().map(|v| package_key(name, v)),
        ctx.current_version.as_deref().map(|v| package_key(name, v)),
        alias,
        ctx.latest_versions.get(name).map(|v| package_key(name, v)),
    ];

    keys.iter()
        .flatten()
        .find_map(|key| ctx.import_paths.get(key))
}

/// Match a sub-path like `fp` or `dist/utils` against a package's files.
///
/// The sub-path is first anchored at the package directory. Failing that,
/// intermediate segments must appear as directories and the last segment
/// must end the file name, followed by an extension or `/index<ext>`.
fn match_subpath(subpath: &str, entry: &ImportPathEntry) -> Option<String> {
    let anchored = vpath::join(&entry.base_dir, subpath);
    if let Some(found) = match_candidate(&anchored, entry.files.iter().map(String::as_str)) {
        return Some(found);
    }

    let segments: Vec<&str> = subpath.split('/').filter(|s| !s.is_empty()).collect();
    let (last, dirs) = segments.split_last()?;
    let in_dirs = |file: &str| dirs.iter().all(|d| file.contains(&format!("/{d}/")));

    let mut suffixes = Vec::new();
    if has_source_extension(last) {
        suffixes.push(format!("/{last}"));
    }
    for ext in RESOLVE_EXTENSIONS {
        if *ext == ".d.ts" && !last.ends_with(".d") {
            continue;
        }
        suffixes.push(format!("/{last}{ext}"));
    }
    for ext in RESOLVE_EXTENSIONS.iter().filter(|ext| **ext != ".d.ts") {
        suffixes.push(format!("/{last}/index{ext}"));
    }

    suffixes.iter().find_map(|suffix| {
        let matches: Vec<&String> = entry
            .files
            .iter()
            .filter(|f| f.ends_with(suffix.as_str()) && in_dirs(f))
            .collect();
        prefer_esm(&matches)
    })
}

/// The declared entry point, if it survived into the file list.
///
/// Entry points may omit the extension (`lib/main`) or name a directory (`./dist`).
fn entry_file(entry: &ImportPathEntry) -> Option<String> {
    let declared = vpath::join(&entry.base_dir, &entry.entry_point);
    if let Some(found) = match_candidate(&declared, entry.files.iter().map(String::as_str)) {
        return Some(found);
    }
    let suffix = format!("/{}", entry.entry_point);
    entry
        .files
        .iter()
        .find(|f| f.ends_with(&suffix) && !f.contains(CJS_MARKER) && has_source_extension(f))
        .cloned()
}

/// The shallowest non-CommonJS `index` file.
fn index_file(entry: &ImportPathEntry) -> Option<String> {
    entry
        .files
        .iter()
        .filter(|f| {
            !f.contains(CJS_MARKER)
                && RESOLVE_EXTENSIONS
                    .iter()
                    .filter(|ext| **ext != ".d.ts")
                    .any(|ext| f.ends_with(&format!("/index{ext}")))
        })
        .min_by_key(|f| f.len())
        .cloned()
}

fn prefer_esm(matches: &[&String]) -> Option<String> {
    matches
        .iter()
        .find(|f| !f.contains(CJS_MARKER))
        .or_else(|| matches.first())
        .map(|f| (*f).clone())
}
