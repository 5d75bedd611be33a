//! In-memory package registry for tests.
//!
//! Compiled for this crate's tests and, through the `test-support` feature,
//! for the integration tests of dependent crates.

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Mutex;

use crate::pkg::{PackageSource, PkgError};

/// Serves published packages and records every tarball download.
#[derive(Default)]
pub struct MockRegistry {
    packuments: HashMap<String, Value>,
    tarballs: HashMap<String, Vec<u8>>,
    downloads: Mutex<Vec<String>>,
    panics: HashSet<String>,
    hangs: HashSet<String>,
}

impl MockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looking up `name` panics.
    pub fn panic_on(mut self, name: &str) -> Self {
        self.panics.insert(name.to_string());
        self
    }

    /// Looking up `name` never completes.
    pub fn hang_on(mut self, name: &str) -> Self {
        self.hangs.insert(name.to_string());
        self
    }

    /// Publish `name@version` with the given `package.json` and extra files,
    /// making it the `latest` tag.
    pub fn publish(&mut self, name: &str, version: &str, manifest: Value, files: &[(&str, &str)]) {
        let manifest = manifest.to_string();
        let mut entries = vec![("package.json", manifest.as_str())];
        entries.extend(files.iter().copied());
        self.publish_archive(name, version, &entries);
    }

    /// Publish `name@version` with exactly `entries` under `package/`.
    pub fn publish_archive(&mut self, name: &str, version: &str, entries: &[(&str, &str)]) {
        let url = tarball_url(name, version);
        let packument = self
            .packuments
            .entry(name.to_string())
            .or_insert_with(|| json!({ "name": name, "versions": {} }));
        packument["versions"][version] = json!({ "dist": { "tarball": url } });
        packument["dist-tags"] = json!({ "latest": version });

        let entries: Vec<(String, &str)> = entries
            .iter()
            .map(|(path, data)| (format!("package/{path}"), *data))
            .collect();
        let entries: Vec<(&str, &str)> = entries.iter().map(|(p, d)| (p.as_str(), *d)).collect();
        self.tarballs.insert(url, tgz(&entries));
    }

    /// How many tarballs of `name` were downloaded.
    pub fn downloads_of(&self, name: &str) -> usize {
        let prefix = format!("https://registry.test/{name}/-/");
        self.downloads
            .lock()
            .expect("download log poisoned")
            .iter()
            .filter(|u| u.starts_with(&prefix))
            .count()
    }
}

fn tarball_url(name: &str, version: &str) -> String {
    format!("https://registry.test/{name}/-/{version}.tgz")
}

impl PackageSource for MockRegistry {
    fn packument<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Value, PkgError>> {
        Box::pin(async move {
            assert!(!self.panics.contains(name), "registry blew up on {name}");
            if self.hangs.contains(name) {
                futures::future::pending::<()>().await;
            }
            self.packuments
                .get(name)
                .cloned()
                .ok_or_else(|| PkgError::not_found(name))
        })
    }

    fn tarball<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, PkgError>> {
        Box::pin(async move {
            self.downloads
                .lock()
                .expect("download log poisoned")
                .push(url.to_string());
            self.tarballs
                .get(url)
                .map(|b| Bytes::from(b.clone()))
                .ok_or_else(|| PkgError::download_failed(url))
        })
    }
}

/// Build a gzipped tarball holding `entries` at exactly the given paths.
#[must_use]
pub fn tgz(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut tar_bytes = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_bytes);
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).expect("valid tar path");
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append(&header, data.as_bytes())
                .expect("tar append");
        }
        builder.finish().expect("tar finish");
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).expect("gzip write");
    encoder.finish().expect("gzip finish")
}
