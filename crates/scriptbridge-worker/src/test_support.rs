//! In-memory registry shared by the worker tests.

use scriptbridge_proto::WorkerRequest;
use std::collections::BTreeMap;

pub(crate) use scriptbridge_core::test_support::MockRegistry;

pub(crate) const LIBS: &str = "libs";

/// A registry where `explode` panics inside the worker and `hang` never answers.
pub(crate) fn mock_registry() -> MockRegistry {
    MockRegistry::new().panic_on("explode").hang_on("hang")
}

/// A request for `name@version` against an empty vault.
pub(crate) fn request(correlation_id: u64, name: &str, version: &str) -> WorkerRequest {
    WorkerRequest {
        correlation_id,
        library_root_dir: LIBS.to_string(),
        vault_root: String::new(),
        vault_file_list: Vec::new(),
        latest_version_index: BTreeMap::new(),
        requested_version: version.to_string(),
        package_name: name.to_string(),
        cached_libraries: BTreeMap::new(),
    }
}
