//! Virtual filesystem seam.
//!
//! Everything the pipeline persists goes through [`VirtualFs`], addressed by
//! vault-relative `/`-separated paths.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

use crate::vpath;

/// Read/write access to the vault.
pub trait VirtualFs: Send + Sync {
    /// Whether a file exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Read a file as UTF-8 text.
    fn read_to_string(&self, path: &str) -> io::Result<String>;

    /// Write a file, replacing any previous contents.
    fn write(&self, path: &str, contents: &str) -> io::Result<()>;

    /// Create a directory and all of its parents.
    fn create_dir_all(&self, path: &str) -> io::Result<()>;

    /// All files in the vault, skipping hidden directories.
    fn list_files(&self) -> io::Result<Vec<String>>;
}

/// A [`VirtualFs`] backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for segment in vpath::normalize(path).split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        full
    }
}

impl VirtualFs for DiskFs {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn read_to_string(&self, path: &str) -> io::Result<String> {
        fs::read_to_string(self.resolve(path))
    }

    fn write(&self, path: &str, contents: &str) -> io::Result<()> {
        let target = self.resolve(path);
        let parent = target.parent().unwrap_or(&self.root);

        // Write to a temp file in the same directory, then rename over the target.
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(contents.as_bytes())?;
        temp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }

    fn create_dir_all(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path))
    }

    fn list_files(&self) -> io::Result<Vec<String>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        for entry in walker {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                files.push(vpath::to_slash(&rel.to_string_lossy()));
            }
        }

        files.sort();
        Ok(files)
    }
}

/// An in-memory [`VirtualFs`].
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file.
    #[must_use]
    pub fn with_file(self, path: &str, contents: &str) -> Self {
        if let Ok(mut files) = self.files.lock() {
            files.insert(vpath::normalize(path), contents.to_string());
        }
        self
    }

    fn files(&self) -> io::Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.files
            .lock()
            .map_err(|_| io::Error::other("memory filesystem lock poisoned"))
    }
}

impl VirtualFs for MemoryFs {
    fn exists(&self, path: &str) -> bool {
        self.files()
            .map(|files| files.contains_key(&vpath::normalize(path)))
            .unwrap_or(false)
    }

    fn read_to_string(&self, path: &str) -> io::Result<String> {
        self.files()?
            .get(&vpath::normalize(path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    fn write(&self, path: &str, contents: &str) -> io::Result<()> {
        self.files()?
            .insert(vpath::normalize(path), contents.to_string());
        Ok(())
    }

    fn create_dir_all(&self, _path: &str) -> io::Result<()> {
        Ok(())
    }

    fn list_files(&self) -> io::Result<Vec<String>> {
        Ok(self
            .files()?
            .keys()
            .filter(|path| !path.split('/').any(|segment| segment.starts_with('.')))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_disk_write_overwrites() {
        let dir = tempdir().unwrap();
        let vfs = DiskFs::new(dir.path());
        vfs.create_dir_all("libs/a@1.0.0").unwrap();
        vfs.write("libs/a@1.0.0/index.js", "one").unwrap();
        vfs.write("libs/a@1.0.0/index.js", "two").unwrap();

        assert_eq!(vfs.read_to_string("libs/a@1.0.0/index.js").unwrap(), "two");
        assert!(vfs.exists("libs/a@1.0.0/index.js"));
    }

    #[test]
    fn test_disk_list_skips_hidden_dirs() {
        let dir = tempdir().unwrap();
        let vfs = DiskFs::new(dir.path());
        vfs.create_dir_all(".obsidian/plugins").unwrap();
        vfs.write(".obsidian/plugins/data.json", "{}").unwrap();
        vfs.create_dir_all("scripts").unwrap();
        vfs.write("scripts/view.jsx", "").unwrap();
        vfs.write("note.md", "").unwrap();

        let files = vfs.list_files().unwrap();
        assert_eq!(files, vec!["note.md".to_string(), "scripts/view.jsx".to_string()]);
    }

    #[test]
    fn test_memory_fs_round_trip() {
        let vfs = MemoryFs::new().with_file("./scripts/a.js", "x");
        assert!(vfs.exists("scripts/a.js"));
        vfs.write("scripts/a.js", "y").unwrap();
        assert_eq!(vfs.read_to_string("scripts/a.js").unwrap(), "y");
        assert!(vfs.read_to_string("missing.js").is_err());
    }
}
