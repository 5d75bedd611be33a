//! Public file-set derivation.
//!
//! A package's manifest describes its public surface in up to three
//! differently shaped fields. Each becomes one [`FileSetStrategy`]; their
//! selections are layered in priority order, and the whole archive is used
//! only when none selects anything. The set is then filtered to loadable sources.

use glob::{MatchOptions, Pattern};

use super::manifest::{strip_dot_slash, PackageManifest};
use super::tarball::VirtualFile;
use crate::vpath;

/// Source extensions kept in a package's file set.
pub const SOURCE_EXTENSIONS: &[&str] = &[".js", ".jsx", ".ts", ".tsx", ".mjs"];

/// Markers for CommonJS/UMD builds that shadow an ESM equivalent.
const BUILD_MARKERS: &[&str] = &["cjs", "umd"];

/// One way of deriving a package's public files from its manifest.
#[derive(Debug, Clone)]
pub enum FileSetStrategy {
    /// Everything under the directory holding the `module` entry.
    ModuleDirectory(String),
    /// The targets of the `exports` map.
    ExportsMap(Vec<Pattern>),
    /// The `files` globs.
    FileGlobs(Vec<Pattern>),
}

impl FileSetStrategy {
    /// The strategies a manifest supports, in priority order.
    #[must_use]
    pub fn from_manifest(manifest: &PackageManifest) -> Vec<Self> {
        let mut strategies = Vec::new();

        if let Some(module) = manifest.module.as_deref() {
            let dir = vpath::dirname(strip_dot_slash(module));
            strategies.push(Self::ModuleDirectory(dir.to_string()));
        }

        if let Some(exports) = &manifest.exports {
            let patterns: Vec<Pattern> = exports
                .targets()
                .iter()
                .filter_map(|target| Pattern::new(target).ok())
                .collect();
            if !patterns.is_empty() {
                strategies.push(Self::ExportsMap(patterns));
            }
        }

        if let Some(files) = &manifest.files {
            let patterns: Vec<Pattern> = files
                .iter()
                .filter(|entry| !entry.starts_with('!'))
                .flat_map(|entry| file_entry_patterns(entry))
                .collect();
            if !patterns.is_empty() {
                strategies.push(Self::FileGlobs(patterns));
            }
        }

        strategies
    }

    /// Whether this strategy includes the file at `path`.
    #[must_use]
    pub fn selects(&self, path: &str) -> bool {
        match self {
            Self::ModuleDirectory(dir) => vpath::strip_dir(path, dir).is_some(),
            Self::ExportsMap(patterns) | Self::FileGlobs(patterns) => patterns
                .iter()
                .any(|p| p.matches_with(path, match_options())),
        }
    }
}

/// A `files` entry names a file, a glob, or a directory (meaning everything below it).
fn file_entry_patterns(entry: &str) -> Vec<Pattern> {
    let entry = strip_dot_slash(entry).trim_end_matches('/');
    if entry.is_empty() {
        return Vec::new();
    }
    [entry.to_string(), format!("{entry}/**/*")]
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect()
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// Derive a package's public, loadable file set.
///
/// Every strategy contributes its matches, in priority order; if none selects
/// a file, the full archive is used. The result is filtered with
/// [`is_loadable`] and [`shadowed_by_unmarked`], dropping duplicate paths.
#[must_use]
pub fn derive_file_set(manifest: &PackageManifest, files: &[VirtualFile]) -> Vec<VirtualFile> {
    let mut selected: Vec<&VirtualFile> = FileSetStrategy::from_manifest(manifest)
        .iter()
        .flat_map(|strategy| files.iter().filter(|f| strategy.selects(&f.path)))
        .collect();
    if selected.is_empty() {
        selected = files.iter().collect();
    }

    let loadable: Vec<&VirtualFile> = selected.into_iter().filter(|f| is_loadable(f)).collect();
    let paths: Vec<&str> = loadable.iter().map(|f| f.path.as_str()).collect();

    let mut out: Vec<VirtualFile> = Vec::new();
    for file in loadable {
        if shadowed_by_unmarked(&file.path, &paths) || out.iter().any(|f| f.path == file.path) {
            continue;
        }
        out.push(file.clone());
    }
    out
}

/// A file is loadable if it has a source extension, is not a source map and is non-empty.
#[must_use]
pub fn is_loadable(file: &VirtualFile) -> bool {
    SOURCE_EXTENSIONS.contains(&vpath::extname(&file.path))
        && !file.path.ends_with("map")
        && !file.contents.is_empty()
}

/// Whether `path` carries a CommonJS/UMD marker and an unmarked sibling exists.
///
/// `dist/index.cjs.js` is shadowed by `dist/index.js`; `dist/umd/x.js` by
/// `dist/x.js`. A marked file with no unmarked equivalent is kept.
#[must_use]
pub fn shadowed_by_unmarked(path: &str, all: &[&str]) -> bool {
    let lower = path.to_ascii_lowercase();
    if !BUILD_MARKERS.iter().any(|m| lower.contains(m)) {
        return false;
    }
    let unmarked = strip_build_markers(path);
    unmarked != path && all.iter().any(|p| *p == unmarked)
}

/// Remove `.cjs`/`-cjs`/`.umd`/`-umd` name tokens and `cjs`/`umd` directory segments.
fn strip_build_markers(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let Some((name, dirs)) = segments.split_last() else {
        return path.to_string();
    };

    let mut kept: Vec<String> = dirs
        .iter()
        .filter(|d| !BUILD_MARKERS.contains(&d.to_ascii_lowercase().as_str()))
        .map(|d| (*d).to_string())
        .collect();

    let mut name = (*name).to_string();
    for marker in BUILD_MARKERS {
        for sep in ['.', '-', '_'] {
            let token = format!("{sep}{marker}");
            // `.cjs` as the final extension is a module flavour, not a marker
            if let Some(idx) = name.find(&token) {
                let end = idx + token.len();
                let rest = &name[end..];
                if rest.starts_with('.') || rest.starts_with('-') {
                    name = format!("{}{rest}", &name[..idx]);
                }
            }
        }
    }
    kept.push(name);
    kept.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> VirtualFile {
        VirtualFile::new(path, "export {};")
    }

    fn manifest(json: &str) -> PackageManifest {
        PackageManifest::parse(json.as_bytes()).unwrap()
    }

    fn paths(files: &[VirtualFile]) -> Vec<&str> {
        files.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn test_strategies_are_layered_in_priority_order() {
        let m = manifest(
            r#"{"module": "./dist/esm/index.js", "exports": "./dist/cjs/index.js", "files": ["src"]}"#,
        );
        let files = vec![
            file("src/index.ts"),
            file("dist/cjs/index.js"),
            file("dist/esm/index.js"),
            file("dist/esm/util.js"),
            file("test/index.js"),
        ];
        assert_eq!(
            paths(&derive_file_set(&m, &files)),
            vec![
                "dist/esm/index.js",
                "dist/esm/util.js",
                "dist/cjs/index.js",
                "src/index.ts"
            ]
        );
    }

    #[test]
    fn test_module_directory_keeps_exports_subpaths() {
        let m = manifest(
            r#"{"module": "./dist/esm/index.js", "exports": {".": "./dist/esm/index.js", "./utils": "./utils/index.js"}}"#,
        );
        let files = vec![file("dist/esm/index.js"), file("utils/index.js")];
        assert_eq!(
            paths(&derive_file_set(&m, &files)),
            vec!["dist/esm/index.js", "utils/index.js"]
        );
    }

    #[test]
    fn test_exports_map_used_without_module() {
        let m = manifest(
            r#"{"exports": {".": {"import": "./dist/index.mjs"}, "./utils/*": "./dist/utils/*.mjs"}}"#,
        );
        let files = vec![
            file("dist/index.mjs"),
            file("dist/utils/a.mjs"),
            file("dist/other.mjs"),
        ];
        assert_eq!(
            paths(&derive_file_set(&m, &files)),
            vec!["dist/index.mjs", "dist/utils/a.mjs"]
        );
    }

    #[test]
    fn test_files_globs_and_directories() {
        let m = manifest(r#"{"files": ["lib", "*.js", "!lib/test.js"]}"#);
        let files = vec![
            file("lib/a.js"),
            file("lib/deep/b.js"),
            file("root.js"),
            file("test/c.js"),
        ];
        assert_eq!(
            paths(&derive_file_set(&m, &files)),
            vec!["lib/a.js", "lib/deep/b.js", "root.js"]
        );
    }

    #[test]
    fn test_falls_back_to_full_archive() {
        let m = manifest(r#"{"main": "index.js", "files": ["missing"]}"#);
        let files = vec![file("index.js"), file("package.json"), file("README.md")];
        assert_eq!(paths(&derive_file_set(&m, &files)), vec!["index.js"]);
    }

    #[test]
    fn test_filters_maps_empty_and_shadowed_builds() {
        let m = manifest("{}");
        let files = vec![
            file("dist/index.js"),
            file("dist/index.js.map"),
            file("dist/index.cjs.js"),
            file("dist/umd/index.js"),
            file("dist/only.umd.js"),
            VirtualFile::new("dist/empty.js", ""),
        ];
        assert_eq!(
            paths(&derive_file_set(&m, &files)),
            vec!["dist/index.js", "dist/only.umd.js"]
        );
    }

    #[test]
    fn test_strip_build_markers() {
        assert_eq!(strip_build_markers("dist/index.cjs.js"), "dist/index.js");
        assert_eq!(strip_build_markers("dist/lib-umd.js"), "dist/lib.js");
        assert_eq!(strip_build_markers("dist/cjs/index.js"), "dist/index.js");
        assert_eq!(strip_build_markers("dist/index.cjs"), "dist/index.cjs");
    }
}
