//! Bare specifier parsing.
//!
//! Parses the module specifiers scripts import packages with:
//! - `lodash`
//! - `lodash/fp`
//! - `preact-markup@2.1.1`
//! - `@preact/signals`
//! - `@preact/signals@1.2.0/dist/signals.mjs`

use super::error::PkgError;

/// A bare specifier split into package name, version pin and sub-path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Pinned version, if the specifier carried `@version`.
    pub version: Option<String>,
    /// Remainder after the package name, without a leading slash.
    pub subpath: Option<String>,
}

impl PackageSpec {
    /// Parse a bare specifier.
    ///
    /// The version pin may follow the name (`pkg@1.0.0/sub`) or the whole
    /// specifier (`pkg/sub@1.0.0`).
    ///
    /// # Errors
    /// Returns an error if the name is empty or a scope has no package name.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(PkgError::spec_invalid("Empty package spec"));
        }

        let (scope, rest) = match input.strip_prefix('@') {
            Some(scoped) => {
                let Some((scope, rest)) = scoped.split_once('/') else {
                    return Err(PkgError::spec_invalid(format!(
                        "Invalid scoped package: missing '/' in '{input}'"
                    )));
                };
                if scope.is_empty() {
                    return Err(PkgError::spec_invalid(format!(
                        "Invalid scoped package: empty scope in '{input}'"
                    )));
                }
                (Some(scope), rest)
            }
            None => (None, input),
        };

        let (head, mut subpath) = match rest.split_once('/') {
            Some((head, sub)) => (head, Some(sub)),
            None => (rest, None),
        };

        let (bare, mut version) = match head.split_once('@') {
            Some((bare, version)) => (bare, Some(version.to_string())),
            None => (head, None),
        };

        // `pkg/sub@1.0.0` carries its pin at the very end
        if version.is_none() {
            if let Some((sub, pin)) = subpath.and_then(|s| s.rsplit_once('@')) {
                subpath = Some(sub);
                version = Some(pin.to_string());
            }
        }

        if bare.is_empty() {
            return Err(PkgError::spec_invalid(format!(
                "Invalid package spec: empty name in '{input}'"
            )));
        }
        if version.as_deref() == Some("") {
            return Err(PkgError::spec_invalid(format!(
                "Invalid package spec: empty version in '{input}'"
            )));
        }

        let name = match scope {
            Some(scope) => format!("@{scope}/{bare}"),
            None => bare.to_string(),
        };
        let subpath = subpath
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
            .map(String::from);

        Ok(Self {
            name,
            version,
            subpath,
        })
    }

    /// The version to request: the pin, or `latest`.
    #[must_use]
    pub fn requested_version(&self) -> &str {
        self.version.as_deref().unwrap_or(super::version::LATEST)
    }
}

/// Build the `name@version` key packages are stored under.
#[must_use]
pub fn package_key(name: &str, version: &str) -> String {
    format!("{name}@{version}")
}

/// Split a `name@version` key. The scope's leading `@` is never a separator.
#[must_use]
pub fn split_package_key(key: &str) -> Option<(&str, &str)> {
    match key.rfind('@') {
        Some(0) | None => None,
        Some(idx) => Some((&key[..idx], &key[idx + 1..])),
    }
}

/// Whether a specifier names a package rather than a file.
///
/// Relative and absolute paths are not bare.
#[must_use]
pub fn is_bare_specifier(spec: &str) -> bool {
    !(spec.is_empty()
        || spec.starts_with("./")
        || spec.starts_with("../")
        || spec == "."
        || spec == ".."
        || spec.starts_with('/'))
}
