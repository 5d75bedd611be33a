//! Module transform engine.
//!
//! Rewrites one ES module, CommonJS module or script so that every
//! cross-module reference goes through the sandbox runtime binding `dc`:
//!
//! ```text
//! import { useState, h } from "preact";     const { useState: useState } = dc.hooks, { h: h } = dc.preact;
//! import x from "./local";              =>  const x = await dc.require("scripts/local.js");
//! module.exports = function foo() {};       return function foo() {};
//! ```
//!
//! The rewrite is two ordered passes over the same tree (see [`rewrite`]),
//! followed by synthesis of the module's return value.

mod build;
mod commonjs;
mod context;
mod diagnostic;
mod exports;
pub(crate) mod parse;
mod rewrite;
pub mod shims;

pub use context::{ImportPathEntry, ImportPathTable, TransformContext};
pub use diagnostic::{codes, Diagnostic, DiagnosticSeverity, TransformError};

use swc_ecma_ast::Expr;
use swc_ecma_visit::VisitMutWith;

use exports::TransformState;
use rewrite::{reference_for, ModuleReference, ModuleRewriter};
use shims::RUNTIME_BINDING;

/// Transformed source plus the non-fatal findings made on the way.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Rewrite `source` (the file at vault-relative `file_path`).
///
/// `ctx.second_pass` is reset and set again while running; everything else in
/// the context is only read.
///
/// # Errors
/// Fails if the source cannot be parsed even with error recovery, or if code
/// generation fails.
pub fn transform(
    source: &str,
    file_path: &str,
    ctx: &mut TransformContext,
) -> Result<TransformOutput, TransformError> {
    let mut parsed = parse::parse_module(source, file_path)?;
    let origin = Some(file_path).filter(|p| !p.is_empty());
    let mut state = TransformState::new(file_path);
    state.diagnostics.append(&mut parsed.recovered);
    if commonjs::reads_exports_object(&parsed.module) {
        state.use_exports_object();
    }

    ctx.second_pass = false;
    parsed
        .module
        .visit_mut_with(&mut ModuleRewriter::new(ctx, origin, &mut state));

    ctx.second_pass = true;
    {
        let mut rewriter = ModuleRewriter::new(ctx, origin, &mut state);
        parsed.module.visit_mut_with(&mut rewriter);
        rewriter.revisit_export_records();
    }

    let spreads = star_spreads(&mut state, ctx, origin);
    exports::finish_module(&mut parsed.module, &mut state, spreads);

    let code = parse::emit_module(parsed)?;
    Ok(TransformOutput {
        code,
        diagnostics: state.diagnostics,
    })
}

/// Runtime values for each `export * from` source; unresolved ones are skipped.
fn star_spreads(
    state: &mut TransformState,
    ctx: &TransformContext,
    origin: Option<&str>,
) -> Vec<Expr> {
    let sources = std::mem::take(&mut state.star_sources);
    let mut spreads = Vec::with_capacity(sources.len());
    for spec in sources {
        match reference_for(&spec, ctx, origin) {
            ModuleReference::Shim(target) => {
                spreads.push(build::runtime_member(target.property_for(None)));
            }
            ModuleReference::Internal => spreads.push(build::ident_expr(RUNTIME_BINDING)),
            ModuleReference::File(path) => spreads.push(build::await_require(&path)),
            ModuleReference::Unresolved => state.unresolved(&spec),
        }
    }
    spreads
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const LIBS: &str = ".obsidian/plugins/scriptbridge/libs";

    fn context() -> TransformContext {
        let pkg = |key: &str, files: &[&str], entry: &str| {
            let base_dir = format!("{LIBS}/{key}");
            (
                key.to_string(),
                ImportPathEntry {
                    files: files.iter().map(|f| format!("{base_dir}/{f}")).collect(),
                    base_dir,
                    entry_point: entry.to_string(),
                },
            )
        };
        TransformContext::new()
            .with_vault_files(["scripts/view.jsx", "scripts/local.js", "scripts/helpers.ts"])
            .with_import_paths(
                [
                    pkg("lodash@4.17.21", &["lodash.js", "fp.js"], "lodash.js"),
                    pkg("utils@1.0.0", &["index.js", "extra.js"], "index.js"),
                ]
                .into_iter()
                .collect(),
            )
            .with_latest_versions(BTreeMap::from([
                ("lodash".to_string(), "4.17.21".to_string()),
                ("utils".to_string(), "1.0.0".to_string()),
            ]))
    }

    fn run(source: &str) -> TransformOutput {
        transform(source, "scripts/view.jsx", &mut context()).unwrap()
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn test_shim_and_relative_imports() {
        let out = run("import { a, b } from \"react\";\nimport x from \"./local\";\nx(a, b);\n");
        assert!(!out.code.contains("import"), "{}", out.code);
        assert!(out.code.contains("dc.preact"), "{}", out.code);
        assert_eq!(count(&out.code, "dc.require"), 1, "{}", out.code);
        assert!(out.code.contains("await dc.require(\"scripts/local.js\")"), "{}", out.code);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_hooks_split_from_components() {
        let out = run("import React, { useState, Fragment } from \"preact\";\n");
        assert!(out.code.contains("useState: useState"), "{}", out.code);
        assert!(out.code.contains("dc.hooks"), "{}", out.code);
        assert!(out.code.contains("Fragment: Fragment"), "{}", out.code);
        assert!(out.code.contains("React = dc.preact"), "{}", out.code);
    }

    #[test]
    fn test_jsx_runtime_import() {
        let out = run("import { jsx as _jsx } from \"react/jsx-runtime\";\n_jsx(\"div\", {});\n");
        assert!(out.code.contains("jsx: _jsx"), "{}", out.code);
        assert!(out.code.contains("dc.jsxRuntime"), "{}", out.code);
    }

    #[test]
    fn test_single_require_per_import_statement() {
        let out = run("import def, * as ns from \"lodash\";\nimport { map, filter as f } from \"lodash/fp\";\n");
        assert_eq!(count(&out.code, "dc.require"), 2, "{}", out.code);
        assert!(out.code.contains("__module0"), "{}", out.code);
        assert!(out.code.contains(&format!("\"{LIBS}/lodash@4.17.21/fp.js\"")), "{}", out.code);
        assert!(out.code.contains("filter: f"), "{}", out.code);
    }

    #[test]
    fn test_side_effect_import() {
        let out = run("import \"./local\";\n");
        assert!(out.code.contains("await dc.require(\"scripts/local.js\");"), "{}", out.code);
    }

    #[test]
    fn test_unresolved_import_is_dropped_with_diagnostic() {
        let out = run("import pad from \"left-pad\";\nconsole.log(1);\n");
        assert!(!out.code.contains("left-pad"), "{}", out.code);
        assert!(!out.code.contains("import"), "{}", out.code);
        assert_eq!(out.diagnostics.len(), 1);
        assert!(out.diagnostics[0].is(codes::UNRESOLVED_SPECIFIER));
    }

    #[test]
    fn test_internal_namespace_calls_and_tags() {
        let out = run(
            "import { Callout, useQuery as q } from \"#datacore\";\nconst rows = q(\"@page\");\nconst view = <Callout title=\"x\" />;\n",
        );
        assert!(!out.code.contains("#datacore"), "{}", out.code);
        assert!(out.code.contains("dc.useQuery(\"@page\")"), "{}", out.code);
        assert!(out.code.contains("<dc.Callout"), "{}", out.code);
    }

    #[test]
    fn test_require_calls() {
        let out = run(
            "const _ = require(\"lodash\");\nconst { useEffect, h } = require(\"preact\");\nrequire(\"missing-pkg\");\n",
        );
        assert!(out.code.contains(&format!("await dc.require(\"{LIBS}/lodash@4.17.21/lodash.js\")")), "{}", out.code);
        assert!(out.code.contains("useEffect } = dc.hooks"), "{}", out.code);
        assert!(out.code.contains("h } = dc.preact"), "{}", out.code);
        let stripped = out.code.replace("dc.require(", "");
        assert!(!stripped.contains("require("), "{}", out.code);
        assert!(!out.code.contains("missing-pkg"), "{}", out.code);
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn test_module_exports_function_is_returned_directly() {
        let out = run("module.exports = function foo() {};\n");
        assert!(out.code.contains("return function foo()"), "{}", out.code);
        assert!(!out.code.contains("module.exports"), "{}", out.code);
    }

    #[test]
    fn test_named_commonjs_exports() {
        let out = run(
            "Object.defineProperty(exports, \"__esModule\", { value: true });\nexports.a = 1;\nmodule.exports.b = 2;\nexports.__esModule = true;\n",
        );
        assert!(!out.code.contains("exports"), "{}", out.code);
        assert!(!out.code.contains("__esModule"), "{}", out.code);
        assert!(out.code.contains("return {"), "{}", out.code);
        assert!(out.code.contains("a: 1"), "{}", out.code);
        assert!(out.code.contains("b: 2"), "{}", out.code);
    }

    #[test]
    fn test_nested_commonjs_exports_use_synthesized_locals() {
        let out = run("if (cond) {\n    module.exports.run = run;\n} else {\n    module.exports = other;\n}\n");
        assert!(out.code.contains("let __exports_run, __module_exports;"), "{}", out.code);
        assert!(out.code.contains("__exports_run = run"), "{}", out.code);
        assert!(out.code.contains("__module_exports = other"), "{}", out.code);
        assert!(out.code.contains("run: __exports_run"), "{}", out.code);
        assert!(out.code.contains("default: __module_exports"), "{}", out.code);
    }

    #[test]
    fn test_chained_assignment_reaches_second_pass() {
        let out = run("exports.a = exports.b = 1;\n");
        assert!(out.code.contains("__exports_b = 1"), "{}", out.code);
        assert!(out.code.contains("b: __exports_b"), "{}", out.code);
        assert!(!out.code.contains("exports.b"), "{}", out.code);
    }

    #[test]
    fn test_nested_define_property_stays_in_scope() {
        let out = run(
            "(function () {\n    var inner = 5;\n    Object.defineProperty(exports, \"v\", { value: inner });\n})();\n",
        );
        assert!(!out.code.contains("defineProperty"), "{}", out.code);
        assert!(out.code.contains("let __exports_v;"), "{}", out.code);
        assert!(out.code.contains("__exports_v = inner"), "{}", out.code);
        assert!(out.code.contains("v: __exports_v"), "{}", out.code);
        assert!(!out.code.contains("v: inner"), "{}", out.code);
    }

    #[test]
    fn test_exports_read_back_use_module_object() {
        let out = run("exports.a = 1;\nexports.b = exports.a + 1;\nmodule.exports.c = module.exports.b;\n");
        assert!(out.code.contains("let __module_exports = {};"), "{}", out.code);
        assert!(out.code.contains("__module_exports.a = 1"), "{}", out.code);
        assert!(out.code.contains("__module_exports.b = __module_exports.a + 1"), "{}", out.code);
        assert!(out.code.contains("__module_exports.c = __module_exports.b"), "{}", out.code);
        assert!(out.code.contains("return __module_exports;"), "{}", out.code);
        let stripped = out.code.replace("__module_exports", "");
        assert!(!stripped.contains("exports"), "{}", out.code);
    }

    #[test]
    fn test_module_exports_reassigned_then_read() {
        let out = run("module.exports = { a: 1 };\nmodule.exports.b = module.exports.a;\n");
        assert!(out.code.contains("\n__module_exports = {"), "{}", out.code);
        assert!(out.code.contains("__module_exports.b = __module_exports.a"), "{}", out.code);
        assert!(out.code.contains("return __module_exports;"), "{}", out.code);
        assert!(!out.code.contains("module.exports"), "{}", out.code);
    }

    #[test]
    fn test_define_property_getter() {
        let out = run(
            "var m = require(\"./local\");\nObject.defineProperty(exports, \"x\", { enumerable: true, get: function () { return m.x; } });\n",
        );
        assert!(!out.code.contains("defineProperty"), "{}", out.code);
        assert!(out.code.contains("return m.x"), "{}", out.code);
        assert!(out.code.contains("x: "), "{}", out.code);
    }

    #[test]
    fn test_ambiguous_chain_is_reported_and_left() {
        let out = run("exports.config.debug = true;\n");
        assert!(out.code.contains("exports.config.debug = true"), "{}", out.code);
        assert!(out.diagnostics.iter().any(|d| d.is(codes::AMBIGUOUS_EXPORT)));
    }

    #[test]
    fn test_esm_exports() {
        let out = run(
            "export const a = 1, { b, c: [d] } = obj;\nexport function f() {}\nexport class K {}\nconst g = 2;\nexport { g as gee };\n",
        );
        assert!(!out.code.contains("export"), "{}", out.code);
        assert!(out.code.contains("const a = 1"), "{}", out.code);
        for key in ["a: a", "b: b", "d: d", "f: f", "K: K", "gee: g"] {
            assert!(out.code.contains(key), "missing {key} in {}", out.code);
        }
    }

    #[test]
    fn test_export_default_function_keeps_declaration() {
        let out = run("export default function View() { return 1; }\nexport const x = 2;\n");
        assert!(out.code.contains("function View()"), "{}", out.code);
        assert!(out.code.contains("default: View"), "{}", out.code);
        assert!(out.code.contains("x: x"), "{}", out.code);
    }

    #[test]
    fn test_lone_export_default_expression() {
        let out = run("export default { answer: 42 };\n");
        assert!(out.code.contains("return {"), "{}", out.code);
        assert!(!out.code.contains("default:"), "{}", out.code);
    }

    #[test]
    fn test_export_star_spreads_before_named() {
        let out = run("export * from \"utils\";\nexport const extra = 1;\n");
        let spread = out.code.find("...await dc.require").unwrap();
        let named = out.code.find("extra: extra").unwrap();
        assert!(spread < named, "{}", out.code);
    }

    #[test]
    fn test_reexports_share_one_require() {
        let out = run("export { default as Utils, extra } from \"utils\";\n");
        assert_eq!(count(&out.code, "dc.require"), 1, "{}", out.code);
        assert!(out.code.contains("Utils: __module0"), "{}", out.code);
        assert!(out.code.contains("extra: __module0.extra"), "{}", out.code);
    }

    #[test]
    fn test_type_only_syntax_is_dropped() {
        let out = transform(
            "import type { Props } from \"./types\";\nexport type { Props };\nexport interface Q { a: number }\nconst n: number = 1;\nexport default n;\n",
            "scripts/helpers.ts",
            &mut context(),
        )
        .unwrap();
        assert!(!out.code.contains("import"), "{}", out.code);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert!(out.code.contains("interface Q"), "{}", out.code);
        assert!(out.code.contains("return n;"), "{}", out.code);
    }

    #[test]
    fn test_parse_failure_is_an_error() {
        let err = transform("export default (", "scripts/broken.js", &mut context()).unwrap_err();
        assert!(err.is_parse_failure());
    }

    #[test]
    fn test_second_pass_flag_is_left_set() {
        let mut ctx = context();
        transform("const a = 1;\n", "scripts/view.jsx", &mut ctx).unwrap();
        assert!(ctx.second_pass);
        let out = transform("module.exports = 1;\n", "scripts/view.jsx", &mut ctx).unwrap();
        assert!(out.code.contains("return 1;"), "{}", out.code);
    }
}
