//! `package.json` model.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::error::PkgError;
use super::tarball::VirtualFile;

/// Fallback entry point when a manifest names neither `module` nor `main`.
pub const DEFAULT_ENTRY_POINT: &str = "index.js";

/// The subset of `package.json` the resolver reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub exports: Option<ExportsMap>,
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, serde_json::Value>,
}

/// The `exports` field: a path, a fallback list, or a map of subpaths/conditions.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExportsMap {
    /// `"exports": "./index.js"`
    Path(String),
    /// `"exports": ["./index.mjs", "./index.js"]`
    List(Vec<ExportsMap>),
    /// `"exports": { ".": { "import": "./index.mjs" } }`
    Conditions(BTreeMap<String, ExportsMap>),
    /// `"./internal/*": null` blocks a subpath.
    Blocked,
}

impl ExportsMap {
    /// Every file target the map references, without a leading `./`.
    ///
    /// Array-valued entries contribute only their first element.
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_targets(&mut out);
        out
    }

    fn collect_targets(&self, out: &mut Vec<String>) {
        match self {
            Self::Path(path) => {
                let path = strip_dot_slash(path);
                if !path.is_empty() && !out.iter().any(|p| p == path) {
                    out.push(path.to_string());
                }
            }
            Self::List(list) => {
                if let Some(first) = list.first() {
                    first.collect_targets(out);
                }
            }
            Self::Conditions(map) => {
                for value in map.values() {
                    value.collect_targets(out);
                }
            }
            Self::Blocked => {}
        }
    }
}

impl PackageManifest {
    /// Parse a manifest from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, PkgError> {
        serde_json::from_slice(bytes)
            .map_err(|e| PkgError::manifest_invalid(format!("Invalid package.json: {e}")))
    }

    /// Find and parse `package.json` among a package's extracted files.
    pub fn from_files(key: &str, files: &[VirtualFile]) -> Result<Self, PkgError> {
        let manifest = files
            .iter()
            .find(|f| f.path == "package.json")
            .ok_or_else(|| PkgError::manifest_missing(key))?;
        Self::parse(&manifest.contents)
            .map_err(|e| PkgError::manifest_invalid(format!("{key}: {}", e.message())))
    }

    /// The package's primary module: `module`, then `main`, then `index.js`.
    #[must_use]
    pub fn entry_point(&self) -> String {
        self.module
            .as_deref()
            .or(self.main.as_deref())
            .map(strip_dot_slash)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_ENTRY_POINT)
            .to_string()
    }

    /// Regular dependencies with string ranges.
    pub fn dependency_ranges(&self) -> impl Iterator<Item = (&str, &str)> {
        string_ranges(&self.dependencies)
    }

    /// Peer dependencies with string ranges.
    pub fn peer_dependency_ranges(&self) -> impl Iterator<Item = (&str, &str)> {
        string_ranges(&self.peer_dependencies)
    }
}

fn string_ranges(
    map: &BTreeMap<String, serde_json::Value>,
) -> impl Iterator<Item = (&str, &str)> {
    map.iter()
        .filter_map(|(name, range)| Some((name.as_str(), range.as_str()?)))
}

/// Remove a leading `./` (or `/`) from a manifest path.
#[must_use]
pub fn strip_dot_slash(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_priority() {
        let m = PackageManifest::parse(br#"{"main": "./lib/index.js", "module": "./es/index.mjs"}"#)
            .unwrap();
        assert_eq!(m.entry_point(), "es/index.mjs");

        let m = PackageManifest::parse(br#"{"main": "lib/index.js"}"#).unwrap();
        assert_eq!(m.entry_point(), "lib/index.js");

        let m = PackageManifest::parse(b"{}").unwrap();
        assert_eq!(m.entry_point(), DEFAULT_ENTRY_POINT);
    }

    #[test]
    fn test_exports_targets() {
        let m = PackageManifest::parse(
            br#"{
                "exports": {
                    ".": {
                        "types": "./dist/index.d.ts",
                        "import": ["./dist/index.mjs", "./dist/index.js"],
                        "require": "./dist/index.cjs"
                    },
                    "./internal/*": null,
                    "./package.json": "./package.json"
                }
            }"#,
        )
        .unwrap();

        let targets = m.exports.unwrap().targets();
        assert!(targets.contains(&"dist/index.d.ts".to_string()));
        assert!(targets.contains(&"dist/index.mjs".to_string()));
        assert!(targets.contains(&"dist/index.cjs".to_string()));
        assert!(!targets.contains(&"dist/index.js".to_string()));
    }

    #[test]
    fn test_exports_string_form() {
        let m = PackageManifest::parse(br#"{"exports": "./index.mjs"}"#).unwrap();
        assert_eq!(m.exports.unwrap().targets(), vec!["index.mjs".to_string()]);
    }

    #[test]
    fn test_non_string_dependency_ranges_are_ignored() {
        let m = PackageManifest::parse(
            br#"{"dependencies": {"a": "^1.0.0", "b": {"version": "2"}}, "peerDependencies": {"react": ">=16"}}"#,
        )
        .unwrap();
        let deps: Vec<_> = m.dependency_ranges().collect();
        assert_eq!(deps, vec![("a", "^1.0.0")]);
        let peers: Vec<_> = m.peer_dependency_ranges().collect();
        assert_eq!(peers, vec![("react", ">=16")]);
    }

    #[test]
    fn test_from_files_missing_manifest() {
        let files = vec![VirtualFile::new("index.js", "x")];
        let err = PackageManifest::from_files("pkg@1.0.0", &files).unwrap_err();
        assert!(err.is_manifest());
    }

    #[test]
    fn test_from_files_invalid_manifest() {
        let files = vec![VirtualFile::new("package.json", "{ nope")];
        let err = PackageManifest::from_files("pkg@1.0.0", &files).unwrap_err();
        assert!(err.is_manifest());
    }
}
