//! Export bookkeeping and the synthesized module return.

use std::collections::HashMap;
use swc_ecma_ast::{Expr, Module, ModuleItem, VarDeclKind};

use super::build;
use super::diagnostic::{codes, Diagnostic};

/// Local standing in for `module.exports`.
pub(crate) const MODULE_EXPORTS_BINDING: &str = "__module_exports";

/// Prefix of locals standing in for `exports.<name>`.
pub(crate) const NAMED_EXPORT_PREFIX: &str = "__exports_";

/// Prefix of temporaries holding a required module.
const MODULE_TEMP_PREFIX: &str = "__module";

/// One exported value, in source order.
#[derive(Debug)]
pub(crate) enum ExportRecord {
    Named { name: String, value: Expr },
    Default(Expr),
}

impl ExportRecord {
    pub fn value_mut(&mut self) -> &mut Expr {
        match self {
            Self::Named { value, .. } | Self::Default(value) => value,
        }
    }
}

/// Everything collected while rewriting one file.
#[derive(Debug)]
pub(crate) struct TransformState {
    file: String,
    pub records: Vec<ExportRecord>,
    /// Specifiers of `export * from` declarations.
    pub star_sources: Vec<String>,
    /// Local name to runtime property for internal-namespace imports.
    pub internal_names: HashMap<String, String>,
    pub diagnostics: Vec<Diagnostic>,
    /// The module reads its CommonJS exports, so they live in a real object.
    pub exports_object: bool,
    export_bindings: Vec<String>,
    temp_count: usize,
}

impl TransformState {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            records: Vec::new(),
            star_sources: Vec::new(),
            internal_names: HashMap::new(),
            diagnostics: Vec::new(),
            exports_object: false,
            export_bindings: Vec::new(),
            temp_count: 0,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Record `name`; `default` is treated as the default export.
    pub fn export(&mut self, name: &str, value: Expr) {
        if name == "default" {
            self.export_default(value);
        } else {
            self.records.push(ExportRecord::Named {
                name: name.to_string(),
                value,
            });
        }
    }

    pub fn export_default(&mut self, value: Expr) {
        self.records.push(ExportRecord::Default(value));
    }

    /// Register a synthesized export local. Returns `false` if it already exists.
    pub fn declare_export_binding(&mut self, name: &str) -> bool {
        if self.export_bindings.iter().any(|b| b == name) {
            return false;
        }
        self.export_bindings.push(name.to_string());
        true
    }

    /// Keep CommonJS exports in a real object and return it as the default.
    pub fn use_exports_object(&mut self) {
        self.exports_object = true;
        self.export_default(build::ident_expr(MODULE_EXPORTS_BINDING));
    }

    /// Export `name` through the synthesized `local`, once per local.
    pub fn export_through_local(&mut self, name: &str, local: &str) {
        if self.declare_export_binding(local) {
            self.export(name, build::ident_expr(local));
        }
    }

    /// A fresh temporary name for a required module.
    pub fn temp_binding(&mut self) -> String {
        let name = format!("{MODULE_TEMP_PREFIX}{}", self.temp_count);
        self.temp_count += 1;
        name
    }

    pub fn unresolved(&mut self, spec: &str) {
        let diag = Diagnostic::warning(format!("Unresolved import '{spec}'"))
            .with_code(codes::UNRESOLVED_SPECIFIER)
            .with_file(self.file.clone());
        self.diagnostics.push(diag);
    }

    /// The module's return value.
    ///
    /// A lone default with nothing else exported is returned as is. Otherwise
    /// an object is built from `export *` spreads, then named exports, then
    /// `default`, so later keys win.
    pub fn return_value(&mut self, spreads: Vec<Expr>) -> Option<Expr> {
        let mut named = Vec::new();
        let mut default = None;
        for record in self.records.drain(..) {
            match record {
                ExportRecord::Named { name, value } => named.push((name, value)),
                ExportRecord::Default(value) => {
                    if default.is_none() {
                        default = Some(value);
                    }
                }
            }
        }

        if named.is_empty() && spreads.is_empty() {
            return default;
        }

        let mut props: Vec<_> = spreads.into_iter().map(build::spread).collect();
        props.extend(named.into_iter().map(|(name, value)| build::key_value(&name, value)));
        if let Some(value) = default {
            props.push(build::key_value("default", value));
        }
        Some(build::object(props))
    }
}

/// Declare the synthesized export locals at the top and append the return.
pub(crate) fn finish_module(module: &mut Module, state: &mut TransformState, spreads: Vec<Expr>) {
    if state.exports_object {
        let object = build::declarator(
            build::binding(MODULE_EXPORTS_BINDING),
            Some(build::object(Vec::new())),
        );
        module
            .body
            .insert(0, ModuleItem::Stmt(build::var_decl(VarDeclKind::Let, vec![object])));
    }
    if !state.export_bindings.is_empty() {
        let decls = state
            .export_bindings
            .drain(..)
            .map(|name| build::declarator(build::binding(&name), None))
            .collect();
        module
            .body
            .insert(0, ModuleItem::Stmt(build::var_decl(VarDeclKind::Let, decls)));
    }

    if let Some(value) = state.return_value(spreads) {
        module.body.push(ModuleItem::Stmt(build::return_stmt(value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lone_default_is_returned_directly() {
        let mut state = TransformState::new("a.js");
        state.export_default(build::ident_expr("main"));
        assert!(matches!(state.return_value(Vec::new()), Some(Expr::Ident(_))));
    }

    #[test]
    fn test_default_with_named_builds_object() {
        let mut state = TransformState::new("a.js");
        state.export_default(build::ident_expr("main"));
        state.export("helper", build::ident_expr("helper"));
        let Some(Expr::Object(obj)) = state.return_value(Vec::new()) else {
            panic!("expected object");
        };
        assert_eq!(obj.props.len(), 2);
    }

    #[test]
    fn test_first_default_wins() {
        let mut state = TransformState::new("a.js");
        state.export_default(build::ident_expr("first"));
        state.export("default", build::ident_expr("second"));
        let Some(Expr::Ident(id)) = state.return_value(Vec::new()) else {
            panic!("expected identifier");
        };
        assert_eq!(&*id.sym, "first");
    }

    #[test]
    fn test_nothing_exported_returns_nothing() {
        let mut state = TransformState::new("a.js");
        assert!(state.return_value(Vec::new()).is_none());
    }

    #[test]
    fn test_export_bindings_are_unique() {
        let mut state = TransformState::new("a.js");
        assert!(state.declare_export_binding("__exports_a"));
        assert!(!state.declare_export_binding("__exports_a"));
        assert_eq!(state.temp_binding(), "__module0");
        assert_eq!(state.temp_binding(), "__module1");
    }
}
