//! npm registry access.

use super::error::PkgError;
use super::tarball::{download_tarball, MAX_TARBALL_SIZE};
use crate::version::USER_AGENT;
use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment variable to override registry URL.
pub const REGISTRY_ENV: &str = "SCRIPTBRIDGE_NPM_REGISTRY";

/// Where package metadata and archives come from.
///
/// The dependency walk only talks to the registry through this trait.
pub trait PackageSource: Send + Sync {
    /// Fetch the packument (package metadata document) for `name`.
    fn packument<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<serde_json::Value, PkgError>>;

    /// Fetch the raw gzipped tarball at `url`.
    fn tarball<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, PkgError>>;
}

/// Registry client for fetching package metadata and tarballs over HTTP.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self, PkgError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| PkgError::registry(format!("Invalid registry URL '{base_url}': {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PkgError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the packument for a package.
    ///
    /// # Errors
    /// Returns an error if the request fails or the package is not found.
    pub async fn fetch_packument(&self, name: &str) -> Result<serde_json::Value, PkgError> {
        let url = self.packument_url(name)?;
        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PkgError::not_found(name));
        }

        if !response.status().is_success() {
            return Err(PkgError::registry(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    fn packument_url(&self, name: &str) -> Result<Url, PkgError> {
        // Scoped names keep their `@` but the slash must be encoded
        let encoded = name.replace('/', "%2F");
        self.base_url
            .join(&encoded)
            .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))
    }
}

impl PackageSource for RegistryClient {
    fn packument<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<serde_json::Value, PkgError>> {
        Box::pin(self.fetch_packument(name))
    }

    fn tarball<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, PkgError>> {
        Box::pin(download_tarball(&self.http, url, MAX_TARBALL_SIZE))
    }
}

/// Extract the latest version from a packument.
#[must_use]
pub fn get_latest_version(packument: &serde_json::Value) -> Option<&str> {
    packument.get("dist-tags")?.get("latest")?.as_str()
}

/// Extract the tarball URL for a specific version.
#[must_use]
pub fn get_tarball_url<'a>(packument: &'a serde_json::Value, version: &str) -> Option<&'a str> {
    packument
        .get("versions")?
        .get(version)?
        .get("dist")?
        .get("tarball")?
        .as_str()
}

/// Get all available version strings from a packument.
#[must_use]
pub fn get_versions(packument: &serde_json::Value) -> Vec<&str> {
    packument
        .get("versions")
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().map(String::as_str).collect())
        .unwrap_or_default()
}
