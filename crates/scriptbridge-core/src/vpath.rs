//! Slash-separated virtual path helpers.
//!
//! Vault and library paths are always `/`-separated strings relative to the
//! vault root, independent of the host platform, so `std::path` is only used
//! at the disk boundary.

/// Convert backslashes to forward slashes.
#[must_use]
pub fn to_slash(path: &str) -> String {
    path.replace('\\', "/")
}

/// Normalize a path: collapse repeated separators and resolve `.` and `..`.
///
/// Leading `..` segments of a relative path are kept.
#[must_use]
pub fn normalize(path: &str) -> String {
    let path = to_slash(path);
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Join `rel` onto `base` and normalize the result.
#[must_use]
pub fn join(base: &str, rel: &str) -> String {
    if base.is_empty() {
        normalize(rel)
    } else {
        normalize(&format!("{base}/{rel}"))
    }
}

/// Everything before the last separator, or `""` for a bare file name.
#[must_use]
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// The last path segment.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Extension of the last segment including the dot, or `""`.
///
/// Dotfiles such as `.eslintrc` have no extension.
#[must_use]
pub fn extname(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &name[idx..],
    }
}

/// Strip `prefix` (a directory) from `path`, returning the remainder.
#[must_use]
pub fn strip_dir<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    path.strip_prefix(prefix)?.strip_prefix('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/./b//c"), "a/b/c");
        assert_eq!(normalize("a/b/../c"), "a/c");
        assert_eq!(normalize("../a"), "../a");
        assert_eq!(normalize("/a/../../b"), "/b");
        assert_eq!(normalize("a\\b"), "a/b");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("libs/pkg@1.0.0/dist", "./util"), "libs/pkg@1.0.0/dist/util");
        assert_eq!(join("libs/pkg@1.0.0/dist", "../src/a.js"), "libs/pkg@1.0.0/src/a.js");
        assert_eq!(join("", "./a.js"), "a.js");
    }

    #[test]
    fn test_dirname_and_file_name() {
        assert_eq!(dirname("a/b/c.js"), "a/b");
        assert_eq!(dirname("c.js"), "");
        assert_eq!(file_name("a/b/c.js"), "c.js");
    }

    #[test]
    fn test_extname() {
        assert_eq!(extname("a/b.js"), ".js");
        assert_eq!(extname("a/b.d.ts"), ".ts");
        assert_eq!(extname("a/.eslintrc"), "");
        assert_eq!(extname("a.b/c"), "");
    }

    #[test]
    fn test_strip_dir() {
        assert_eq!(strip_dir("libs/a@1/x.js", "libs/a@1"), Some("x.js"));
        assert_eq!(strip_dir("libs/a@10/x.js", "libs/a@1"), None);
        assert_eq!(strip_dir("x.js", ""), Some("x.js"));
    }
}
