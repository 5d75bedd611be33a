//! `scriptbridge resolve` command implementation.

use miette::{IntoDiagnostic, Result};
use scriptbridge_core::{
    resolve_path, vpath, Config, DiskFs, ResolutionCache, TransformContext, VirtualFs,
};
use serde::Serialize;

/// Resolve result for JSON output.
#[derive(Serialize)]
struct ResolveResult {
    ok: bool,
    specifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    resolved: Option<String>,
}

pub fn run(config: &Config, specifier: &str, from: Option<&str>, json: bool) -> Result<()> {
    let vfs = DiskFs::new(config.vault_root.clone());
    let cache = ResolutionCache::load(&vfs, &config.cache_file).into_diagnostic()?;
    let ctx = TransformContext::new()
        .with_vault_root(vpath::to_slash(&config.vault_root.to_string_lossy()))
        .with_vault_files(vfs.list_files().into_diagnostic()?)
        .with_import_paths(cache.import_paths())
        .with_latest_versions(cache.latest_version_index.clone());

    let from = from.map(vpath::normalize);
    let resolved = resolve_path(specifier, &ctx, from.as_deref());
    let path = resolved.as_path().map(String::from);

    if json {
        super::print_json(&ResolveResult {
            ok: path.is_some(),
            specifier: specifier.to_string(),
            from,
            resolved: path.clone(),
        })?;
    } else if let Some(path) = &path {
        println!("{path}");
    } else {
        eprintln!("error: cannot resolve '{specifier}'");
    }

    if path.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
