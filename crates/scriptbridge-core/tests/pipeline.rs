//! Resolve, materialize and transform against an in-memory registry.

use serde_json::json;
use std::collections::BTreeMap;

use scriptbridge_core::test_support::MockRegistry;
use scriptbridge_core::{
    extract_bare_imports, transform, DependencyResolver, MemoryFs, PackageMaterializer,
    ResolutionCache, TransformContext, VirtualFs,
};

const LIBS: &str = ".obsidian/plugins/scriptbridge/libs";
const CACHE: &str = ".obsidian/plugins/scriptbridge/data.json";

fn registry() -> MockRegistry {
    let mut reg = MockRegistry::new();
    reg.publish(
        "charts",
        "3.1.0",
        json!({
            "name": "charts",
            "version": "3.1.0",
            "module": "esm/index.js",
            "dependencies": { "color": "^1.0.0" },
            "peerDependencies": { "preact": "^10.0.0" }
        }),
        &[
            (
                "esm/index.js",
                "import { h } from \"preact\";\nimport { useMemo } from \"preact/hooks\";\nimport mix from \"color\";\nexport * from \"./bar\";\nexport function Chart() { const c = useMemo(() => mix(), []); return h(\"svg\", { fill: c }); }\n",
            ),
            ("esm/bar.js", "export const Bar = () => null;\n"),
            ("README.md", "# charts"),
        ],
    );
    reg.publish(
        "color",
        "1.4.0",
        json!({ "name": "color", "version": "1.4.0", "main": "index.js" }),
        &[("index.js", "module.exports = function mix() { return \"red\"; };\n")],
    );
    reg
}

#[tokio::test]
async fn test_resolve_materialize_transform() {
    let reg = registry();
    let vfs = MemoryFs::new().with_file(
        "scripts/dashboard.jsx",
        "import { Chart } from \"charts\";\nimport { Callout } from \"#datacore\";\nexport default () => <Callout><Chart /></Callout>;\n",
    );
    let source = vfs.read_to_string("scripts/dashboard.jsx").unwrap();
    let vault_files = vfs.list_files().unwrap();

    let scan_ctx = TransformContext::new().with_vault_files(vault_files.clone());
    let imports = extract_bare_imports(&source, "scripts/dashboard.jsx", &scan_ctx);
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].name, "charts");

    let mut cache = ResolutionCache::load(&vfs, CACHE).unwrap();
    let resolution = DependencyResolver::new(&reg)
        .resolve("charts", imports[0].requested_version(), &cache.latest_version_index)
        .await
        .unwrap();
    assert_eq!(resolution.root.version, "3.1.0");
    assert_eq!(
        resolution.packages.keys().collect::<Vec<_>>(),
        vec!["charts@3.1.0", "color@1.4.0"]
    );

    let materializer = PackageMaterializer::new(LIBS).with_vault_files(vault_files.clone());
    let built = materializer.build_content(&resolution, &cache.downloaded_libraries);
    assert!(built.skipped.is_empty(), "{:?}", built.skipped);

    let charts = &built.content["charts@3.1.0"];
    let index = charts
        .files
        .iter()
        .find(|f| f.path == "esm/index.js")
        .unwrap();
    assert!(index.transformed_text.contains("dc.preact"), "{}", index.transformed_text);
    assert!(index.transformed_text.contains("dc.hooks"), "{}", index.transformed_text);
    assert!(
        index
            .transformed_text
            .contains(&format!("\"{LIBS}/color@1.4.0/index.js\"")),
        "{}",
        index.transformed_text
    );
    assert!(
        index
            .transformed_text
            .contains(&format!("...await dc.require(\"{LIBS}/charts@3.1.0/esm/bar.js\")")),
        "{}",
        index.transformed_text
    );

    let report = materializer.persist(&vfs, &built.content, &resolution.latest, &mut cache);
    assert!(report.is_clean());
    cache.save(&vfs, CACHE).unwrap();
    assert!(vfs.exists(&format!("{LIBS}/color@1.4.0/index.js")));

    let cache = ResolutionCache::load(&vfs, CACHE).unwrap();
    assert!(cache.is_cached("charts", "latest"));
    assert!(cache.is_cached("color", "1.4.0"));

    let mut ctx = TransformContext::new()
        .with_vault_files(vault_files)
        .with_import_paths(cache.import_paths())
        .with_dependencies(vec!["charts@3.1.0".to_string()])
        .with_latest_versions(cache.latest_version_index.clone());
    let out = transform(&source, "scripts/dashboard.jsx", &mut ctx).unwrap();
    assert!(!out.code.contains("import"), "{}", out.code);
    assert!(
        out.code
            .contains(&format!("await dc.require(\"{LIBS}/charts@3.1.0/esm/index.js\")")),
        "{}",
        out.code
    );
    assert!(out.code.contains("<dc.Callout>"), "{}", out.code);
    assert!(out.code.contains("return () =>"), "{}", out.code);
}

#[tokio::test]
async fn test_cached_packages_are_not_fetched_again() {
    let reg = registry();
    let resolution = DependencyResolver::new(&reg)
        .with_cached(["color@1.4.0".to_string()])
        .resolve("charts", "latest", &BTreeMap::new())
        .await
        .unwrap();
    assert!(resolution.packages.contains_key("charts@3.1.0"));
    assert!(!resolution.packages.contains_key("color@1.4.0"));
    assert_eq!(
        resolution.packages["charts@3.1.0"].dependencies,
        vec!["color@1.4.0".to_string()]
    );
}

#[tokio::test]
async fn test_unknown_root_fails() {
    let reg = registry();
    let err = DependencyResolver::new(&reg)
        .resolve("missing", "latest", &BTreeMap::new())
        .await
        .unwrap_err();
    assert!(err.is_network());
}
