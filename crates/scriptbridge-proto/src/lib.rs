#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Message types for the scriptbridge worker channel.
//!
//! The host and the resolver worker exchange these messages over a single
//! asynchronous channel. Every request carries a host-generated correlation
//! id that its reply echoes back.
//!
//! ## Wire format
//! Messages travel as length-prefixed JSON:
//! - 4-byte little-endian u32 length prefix
//! - JSON payload bytes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;

/// Protocol schema version. Bump when changing message format.
pub const PROTO_SCHEMA_VERSION: u32 = 1;

/// Failure codes carried by [`WorkerReply::Failed`] and [`WorkerReply::Fatal`].
pub mod codes {
    pub const PROTO_VERSION_MISMATCH: &str = "PROTO_VERSION_MISMATCH";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

    // Root package failures
    pub const PKG_SPEC_INVALID: &str = "PKG_SPEC_INVALID";
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    pub const PKG_VERSION_NOT_FOUND: &str = "PKG_VERSION_NOT_FOUND";
    pub const PKG_REGISTRY_ERROR: &str = "PKG_REGISTRY_ERROR";
    pub const PKG_DOWNLOAD_FAILED: &str = "PKG_DOWNLOAD_FAILED";
    pub const PKG_EXTRACT_FAILED: &str = "PKG_EXTRACT_FAILED";
    pub const PKG_MANIFEST_MISSING: &str = "PKG_MANIFEST_MISSING";
    pub const PKG_MANIFEST_INVALID: &str = "PKG_MANIFEST_INVALID";

    // Worker lifecycle
    pub const WORKER_FATAL: &str = "WORKER_FATAL";
    pub const WORKER_SHUTDOWN: &str = "WORKER_SHUTDOWN";
}

/// A cached library the worker may reuse instead of fetching it again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLibrary {
    pub base_dir: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub entry_point: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub latest: String,
}

/// Resolve one package and transform everything it pulls in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub correlation_id: u64,
    /// Vault-relative directory packages are materialized into.
    pub library_root_dir: String,
    pub vault_root: String,
    pub vault_file_list: Vec<String>,
    pub latest_version_index: BTreeMap<String, String>,
    /// `latest`, an exact version or a range.
    pub requested_version: String,
    pub package_name: String,
    /// Libraries already materialized, keyed by `name@version`.
    #[serde(default)]
    pub cached_libraries: BTreeMap<String, CachedLibrary>,
}

/// One transformed file, relative to its package directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedFile {
    pub path: String,
    pub transformed_text: String,
}

/// A resolved package ready to be written into the vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageContent {
    pub entry_point: String,
    pub latest_version: String,
    pub base_dir: String,
    /// Dependencies as `name@version` keys.
    pub dependencies: Vec<String>,
    pub files: Vec<TransformedFile>,
}

/// A package file left out of the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub package: String,
    pub path: String,
    pub reason: String,
}

/// A dependency branch abandoned during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchFailureInfo {
    pub name: String,
    pub spec: String,
    pub code: String,
    pub message: String,
}

/// A successful resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub correlation_id: u64,
    pub package_name: String,
    pub resolved_version: String,
    /// Transformed packages keyed by `name@version`.
    pub content: BTreeMap<String, PackageContent>,
    /// Latest known version per package name.
    pub latest: BTreeMap<String, String>,
    #[serde(default)]
    pub skipped: Vec<SkippedFile>,
    #[serde(default)]
    pub failures: Vec<BranchFailureInfo>,
}

impl WorkerResponse {
    /// The root package's key.
    #[must_use]
    pub fn root_key(&self) -> String {
        format!("{}@{}", self.package_name, self.resolved_version)
    }
}

/// A message from host to worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Resolve {
        request: Box<WorkerRequest>,
    },

    /// Stop the worker after the current request.
    Shutdown,
}

/// A message from worker to host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    /// The package resolved (boxed to reduce enum size).
    Resolved { response: Box<WorkerResponse> },

    /// The root package could not be resolved.
    Failed {
        correlation_id: u64,
        /// Stable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// The worker hit an unrecoverable error; every pending request fails.
    Fatal { message: String },
}

impl WorkerReply {
    #[must_use]
    pub fn failed(correlation_id: u64, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            correlation_id,
            code: code.into(),
            message: message.into(),
        }
    }

    /// The correlation id this reply answers, if it answers one request.
    #[must_use]
    pub fn correlation_id(&self) -> Option<u64> {
        match self {
            Self::Resolved { response } => Some(response.correlation_id),
            Self::Failed { correlation_id, .. } => Some(*correlation_id),
            Self::Fatal { .. } => None,
        }
    }
}

/// A message with the schema version it was written against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame<T> {
    pub proto_schema_version: u32,
    pub message: T,
}

impl<T> Frame<T> {
    #[must_use]
    pub fn new(message: T) -> Self {
        Self {
            proto_schema_version: PROTO_SCHEMA_VERSION,
            message,
        }
    }
}

/// Maximum frame size for sanity checking (256 MiB; responses carry whole packages).
const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// Encode a message to bytes with length prefix.
///
/// Format: 4-byte little-endian length + JSON bytes
///
/// # Errors
/// Returns an error if serialization fails.
pub fn encode_frame<T: Serialize>(message: &T) -> io::Result<Vec<u8>> {
    let json = serde_json::to_vec(&Frame::new(message))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let len = u32::try_from(json.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame too large"))?;

    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&json);

    Ok(buf)
}

/// Decode a length-prefixed frame.
///
/// # Errors
/// Returns an error if the prefix does not match the payload, the payload
/// does not deserialize, or it was written against another schema version.
pub fn decode_frame<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> io::Result<T> {
    if bytes.len() < 4 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "missing length prefix"));
    }
    let (len_buf, payload) = bytes.split_at(4);
    let len = u32::from_le_bytes([len_buf[0], len_buf[1], len_buf[2], len_buf[3]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes"),
        ));
    }
    if len != payload.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} does not match payload of {} bytes", payload.len()),
        ));
    }

    let frame: Frame<T> = serde_json::from_slice(payload)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if frame.proto_schema_version != PROTO_SCHEMA_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{}: expected schema {PROTO_SCHEMA_VERSION}, got {}",
                codes::PROTO_VERSION_MISMATCH,
                frame.proto_schema_version
            ),
        ));
    }
    Ok(frame.message)
}
