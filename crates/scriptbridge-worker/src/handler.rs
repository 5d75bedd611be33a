//! Request handling inside the worker.

use std::collections::BTreeMap;

use scriptbridge_core::materialize::SkipReason;
use scriptbridge_core::{CacheEntry, DependencyResolver, PackageMaterializer, PackageSource};
use scriptbridge_proto::{BranchFailureInfo, SkippedFile, WorkerReply, WorkerRequest, WorkerResponse};
use tracing::{debug, info, warn};

use crate::convert::{cache_entry, package_content};

/// Resolve the requested package, transform every file it pulls in and
/// build the reply.
///
/// Only a failure of the root package produces [`WorkerReply::Failed`];
/// failures below it are logged and listed in the response.
pub async fn handle_request(source: &dyn PackageSource, request: WorkerRequest) -> WorkerReply {
    let id = request.correlation_id;
    debug!(
        correlation_id = id,
        package = %request.package_name,
        version = %request.requested_version,
        "resolving package"
    );

    let cached: BTreeMap<String, CacheEntry> = request
        .cached_libraries
        .iter()
        .filter(|(_, library)| !library.files.is_empty())
        .map(|(key, library)| (key.clone(), cache_entry(library)))
        .collect();

    let resolver = DependencyResolver::new(source).with_cached(cached.keys().cloned());
    let resolution = match resolver
        .resolve(
            &request.package_name,
            &request.requested_version,
            &request.latest_version_index,
        )
        .await
    {
        Ok(resolution) => resolution,
        Err(e) => {
            warn!(correlation_id = id, package = %request.package_name, error = %e, "root package failed");
            return WorkerReply::failed(id, e.code(), e.message());
        }
    };

    for failure in &resolution.failures {
        warn!(
            package = %failure.name,
            spec = %failure.spec,
            error = %failure.error,
            "Skipping dependency branch"
        );
    }

    let built = PackageMaterializer::new(request.library_root_dir.clone())
        .with_vault_root(request.vault_root.clone())
        .with_vault_files(request.vault_file_list.iter().cloned())
        .build_content(&resolution, &cached);

    for diagnostic in &built.diagnostics {
        debug!(%diagnostic, "transform diagnostic");
    }

    let skipped = built
        .skipped
        .iter()
        .map(|file| {
            let reason = match &file.reason {
                SkipReason::Flow => "flow source".to_string(),
                SkipReason::Transform(e) => e.to_string(),
            };
            warn!(package = %file.package, path = %file.path, %reason, "Skipping file");
            SkippedFile {
                package: file.package.clone(),
                path: file.path.clone(),
                reason,
            }
        })
        .collect();

    let failures = resolution
        .failures
        .iter()
        .map(|failure| BranchFailureInfo {
            name: failure.name.clone(),
            spec: failure.spec.clone(),
            code: failure.error.code().to_string(),
            message: failure.error.message().to_string(),
        })
        .collect();

    info!(
        correlation_id = id,
        package = %resolution.root.name,
        version = %resolution.root.version,
        packages = built.content.len(),
        "resolved package"
    );

    WorkerReply::Resolved {
        response: Box::new(WorkerResponse {
            correlation_id: id,
            package_name: resolution.root.name,
            resolved_version: resolution.root.version,
            content: built
                .content
                .into_iter()
                .map(|(key, package)| (key, package_content(package)))
                .collect(),
            latest: resolution.latest,
            skipped,
            failures,
        }),
    }
}
