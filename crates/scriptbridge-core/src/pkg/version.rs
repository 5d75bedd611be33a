//! Version resolution using semver.

use super::error::PkgError;
use super::registry::{get_latest_version, get_versions};
use semver::{Version, VersionReq};

/// The pseudo-version meaning "whatever the registry tags as latest".
pub const LATEST: &str = "latest";

/// Strip the `~`, `^` and `*` range operators from a dependency range.
///
/// A caret or tilde range collapses to its lower bound, which is then queued
/// as an exact version. A bare `*` (or an empty range) becomes [`LATEST`].
#[must_use]
pub fn strip_range_operators(range: &str) -> String {
    let stripped: String = range.chars().filter(|c| !matches!(c, '~' | '^' | '*')).collect();
    let stripped = stripped.trim();
    if stripped.is_empty() {
        LATEST.to_string()
    } else {
        stripped.to_string()
    }
}

/// Resolve a version spec against a packument.
///
/// # Rules
/// - `latest` returns `dist-tags.latest`, or the highest listed version if the tag is absent
/// - An exact version is returned if the registry lists it
/// - Anything else is a semver range; the highest satisfying version wins
/// - OR ranges like `^1.0.0 || ^2.0.0` are supported
pub fn resolve_version(packument: &serde_json::Value, spec: &str) -> Result<String, PkgError> {
    let name = packument
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    let mut parsed: Vec<Version> = get_versions(packument)
        .iter()
        .filter_map(|v| Version::parse(v).ok())
        .collect();
    parsed.sort_by(|a, b| b.cmp(a));

    let spec = spec.trim();
    if spec.is_empty() || spec == LATEST {
        if let Some(latest) = get_latest_version(packument) {
            return Ok(latest.to_string());
        }
        return parsed
            .first()
            .map(ToString::to_string)
            .ok_or_else(|| PkgError::version_not_found(name, LATEST));
    }

    if Version::parse(spec).is_ok() && get_versions(packument).contains(&spec) {
        return Ok(spec.to_string());
    }

    let reqs = parse_or_range(spec)?;
    parsed
        .iter()
        .find(|version| reqs.iter().any(|req| req.matches(version)))
        .map(ToString::to_string)
        .ok_or_else(|| PkgError::version_not_found(name, spec))
}

/// Whether `version` satisfies the npm-style `range`.
///
/// Unparseable ranges or versions never satisfy.
#[must_use]
pub fn version_satisfies(range: &str, version: &str) -> bool {
    let Ok(version) = Version::parse(version.trim()) else {
        return false;
    };
    match parse_or_range(range) {
        Ok(reqs) => reqs.iter().any(|req| req.matches(&version)),
        Err(_) => false,
    }
}

/// Parse a range that may contain `||` alternatives.
///
/// Invalid alternatives are skipped as long as at least one parses.
fn parse_or_range(range: &str) -> Result<Vec<VersionReq>, PkgError> {
    let reqs: Vec<VersionReq> = range
        .split("||")
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .filter_map(|alt| parse_range(alt).ok())
        .collect();

    if reqs.is_empty() {
        return Err(PkgError::spec_invalid(format!(
            "Invalid version range '{range}': no valid alternatives"
        )));
    }
    Ok(reqs)
}

/// Parse a single npm range into a [`VersionReq`].
///
/// Handles hyphen ranges (`1.0.0 - 2.0.0`), x-ranges (`1.x`, `1.2.*`, `*`)
/// and space-separated comparators (`>= 2.1.2 < 3.0.0`).
fn parse_range(range: &str) -> Result<VersionReq, PkgError> {
    let range = range.trim();

    let converted = if let Some((start, end)) = range.split_once(" - ") {
        format!(">={}, <={}", start.trim(), end.trim())
    } else if range == "*" || range.split('.').any(|p| matches!(p, "x" | "X" | "*")) {
        convert_x_range(range)
    } else {
        join_comparators(range)
    };

    VersionReq::parse(&converted)
        .map_err(|e| PkgError::spec_invalid(format!("Invalid version range '{range}': {e}")))
}

/// Join npm's whitespace-separated comparators with commas.
///
/// An operator separated from its version by a space (`>= 2.1.2`) is glued
/// back onto the version first.
fn join_comparators(range: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().any(|c| c.is_ascii_digit()) {
            comparators.push(format!("{pending_op}{token}"));
            pending_op.clear();
        } else {
            pending_op.push_str(token);
        }
    }

    if comparators.is_empty() {
        return range.to_string();
    }
    comparators.join(", ")
}

/// Convert an x-range to comparator form.
fn convert_x_range(range: &str) -> String {
    let parts: Vec<&str> = range.split('.').collect();
    let is_wild = |p: &str| matches!(p, "x" | "X" | "*");

    match parts.as_slice() {
        [major, minor, ..] if is_wild(minor) => match major.parse::<u64>() {
            Ok(m) => format!(">={m}.0.0, <{}.0.0", m + 1),
            Err(_) => ">=0.0.0".to_string(),
        },
        [major, minor, patch] if is_wild(patch) => {
            match (major.parse::<u64>(), minor.parse::<u64>()) {
                (Ok(m), Ok(n)) => format!(">={m}.{n}.0, <{m}.{}.0", n + 1),
                _ => ">=0.0.0".to_string(),
            }
        }
        _ => ">=0.0.0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_packument(versions: &[&str], latest: Option<&str>) -> serde_json::Value {
        let mut versions_obj = serde_json::Map::new();
        for v in versions {
            versions_obj.insert(
                (*v).to_string(),
                json!({ "dist": { "tarball": format!("https://registry.example/pkg-{v}.tgz") } }),
            );
        }

        let mut packument = json!({ "name": "test-pkg", "versions": versions_obj });
        if let Some(latest) = latest {
            packument["dist-tags"] = json!({ "latest": latest });
        }
        packument
    }

    #[test]
    fn test_latest_uses_dist_tag() {
        let packument = make_packument(&["1.0.0", "2.0.0", "3.0.0-beta.1"], Some("2.0.0"));
        assert_eq!(resolve_version(&packument, "latest").unwrap(), "2.0.0");
    }

    #[test]
    fn test_latest_without_tag_picks_highest() {
        let packument = make_packument(&["1.0.0", "10.0.0", "9.0.0"], None);
        assert_eq!(resolve_version(&packument, "latest").unwrap(), "10.0.0");
    }

    #[test]
    fn test_exact_version() {
        let packument = make_packument(&["1.0.0", "1.1.0"], Some("1.1.0"));
        assert_eq!(resolve_version(&packument, "1.0.0").unwrap(), "1.0.0");
    }

    #[test]
    fn test_missing_exact_version_falls_back_to_range() {
        // `1.0.0` as a semver requirement means `^1.0.0`
        let packument = make_packument(&["1.0.1", "1.2.0"], Some("1.2.0"));
        assert_eq!(resolve_version(&packument, "1.0.0").unwrap(), "1.2.0");
    }

    #[test]
    fn test_ranges() {
        let packument = make_packument(&["1.0.0", "1.5.0", "2.0.0", "2.3.1"], Some("2.3.1"));
        assert_eq!(resolve_version(&packument, "^1.0.0").unwrap(), "1.5.0");
        assert_eq!(resolve_version(&packument, "1.x").unwrap(), "1.5.0");
        assert_eq!(resolve_version(&packument, ">= 1.0.0 < 2.0.0").unwrap(), "1.5.0");
        assert_eq!(resolve_version(&packument, "1.0.0 - 2.0.0").unwrap(), "2.0.0");
        assert_eq!(resolve_version(&packument, "^0.9.0 || ^2.0.0").unwrap(), "2.3.1");
    }

    #[test]
    fn test_unsatisfiable_range() {
        let packument = make_packument(&["1.0.0"], Some("1.0.0"));
        let err = resolve_version(&packument, "^5.0.0").unwrap_err();
        assert_eq!(err.code(), crate::pkg::error::codes::PKG_VERSION_NOT_FOUND);
    }

    #[test]
    fn test_version_satisfies() {
        assert!(version_satisfies("^18.0.0", "18.2.0"));
        assert!(version_satisfies(">=16.8.0 || ^17", "17.0.2"));
        assert!(!version_satisfies("^17.0.0", "18.2.0"));
        assert!(!version_satisfies("not a range", "1.0.0"));
        assert!(!version_satisfies("^1.0.0", "latest"));
    }

    #[test]
    fn test_strip_range_operators() {
        assert_eq!(strip_range_operators("^1.2.3"), "1.2.3");
        assert_eq!(strip_range_operators("~0.4.0"), "0.4.0");
        assert_eq!(strip_range_operators("*"), LATEST);
        assert_eq!(strip_range_operators(">=1.0.0 <2.0.0"), ">=1.0.0 <2.0.0");
    }
}
