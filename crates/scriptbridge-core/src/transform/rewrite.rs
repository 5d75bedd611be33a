//! The module rewriting visitor.
//!
//! One visitor runs twice over the same tree. The first pass replaces every
//! import, export and `require` with runtime calls and lifts top-level
//! CommonJS export statements into export records. The second pass, selected
//! by [`TransformContext::second_pass`], only revisits expressions: it
//! rewrites the export-shaped assignments that survived the first, or every
//! use of the exports object when the module reads it back.

use std::collections::HashMap;
use swc_common::DUMMY_SP;
use swc_ecma_ast::{
    AssignOp, CallExpr, Callee, ClassDecl, ClassExpr, Decl, DefaultDecl, EmptyStmt, ExportSpecifier,
    Expr, ExprStmt, FnDecl, FnExpr, ImportDecl, ImportSpecifier, JSXElementName, Module,
    ModuleDecl, ModuleItem, NamedExport, ObjectPat, ObjectPatProp, Pat, PropName, Stmt,
    TsImportEqualsDecl, TsModuleName, TsModuleRef, VarDecl, VarDeclarator,
};
use swc_ecma_visit::{VisitMut, VisitMutWith};

use super::build;
use super::commonjs::{self, AssignmentShape, DefinedExport, ES_MODULE_FLAG};
use super::context::TransformContext;
use super::exports::TransformState;
use super::parse::jsx_member_name;
use super::shims::{
    is_hook_name, is_internal_namespace, runtime_shim, ShimTarget, HOOKS_PROPERTY,
    RUNTIME_BINDING, UI_PROPERTY,
};
use crate::resolver::{resolve_path, ResolvedPath};

/// What a module specifier refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ModuleReference {
    Shim(ShimTarget),
    Internal,
    File(String),
    Unresolved,
}

pub(crate) fn reference_for(
    spec: &str,
    ctx: &TransformContext,
    origin: Option<&str>,
) -> ModuleReference {
    if let Some(target) = runtime_shim(spec) {
        return ModuleReference::Shim(target);
    }
    if is_internal_namespace(spec) {
        return ModuleReference::Internal;
    }
    match resolve_path(spec, ctx, origin) {
        ResolvedPath::File(path) => ModuleReference::File(path),
        ResolvedPath::Unresolved => ModuleReference::Unresolved,
    }
}

/// A local introduced by an import.
#[derive(Debug)]
enum ImportBinding {
    /// `{ imported as local }`
    Named { imported: String, local: String },
    /// Default or namespace import: the whole module.
    Whole(String),
}

/// Where re-exported values are read from.
enum ReexportBase {
    Binding(String),
    Shim(ShimTarget),
    Runtime,
}

impl ReexportBase {
    fn value(&self, imported: &str) -> Expr {
        let object = match self {
            Self::Binding(name) => build::ident_expr(name),
            Self::Shim(target) => build::runtime_member(target.property_for(Some(imported))),
            Self::Runtime => build::ident_expr(RUNTIME_BINDING),
        };
        if imported == "default" {
            object
        } else {
            build::member(object, imported)
        }
    }

    fn whole(&self) -> Expr {
        match self {
            Self::Binding(name) => build::ident_expr(name),
            Self::Shim(target) => build::runtime_member(target.property_for(None)),
            Self::Runtime => build::ident_expr(RUNTIME_BINDING),
        }
    }
}

pub(crate) struct ModuleRewriter<'a> {
    ctx: &'a TransformContext,
    origin: Option<&'a str>,
    state: &'a mut TransformState,
    jsx_names: HashMap<String, JSXElementName>,
    /// Statement nesting; `0` while visiting a module-level statement.
    depth: usize,
}

impl<'a> ModuleRewriter<'a> {
    pub fn new(
        ctx: &'a TransformContext,
        origin: Option<&'a str>,
        state: &'a mut TransformState,
    ) -> Self {
        Self {
            ctx,
            origin,
            state,
            jsx_names: HashMap::new(),
            depth: 0,
        }
    }

    /// Run the assignment rewrite over values lifted into export records.
    pub fn revisit_export_records(&mut self) {
        let mut records = std::mem::take(&mut self.state.records);
        for record in &mut records {
            record.value_mut().visit_mut_with(self);
        }
        records.append(&mut self.state.records);
        self.state.records = records;
    }

    fn reference(&mut self, spec: &str) -> ModuleReference {
        let reference = reference_for(spec, self.ctx, self.origin);
        if reference == ModuleReference::Unresolved {
            self.state.unresolved(spec);
        }
        reference
    }

    fn require_value(&mut self, spec: &str) -> Expr {
        match self.reference(spec) {
            ModuleReference::Shim(target) => build::runtime_member(target.property_for(None)),
            ModuleReference::Internal => build::ident_expr(RUNTIME_BINDING),
            ModuleReference::File(path) => build::await_require(&path),
            ModuleReference::Unresolved => build::undefined(),
        }
    }

    fn jsx_member(&mut self, property: &str) -> Option<JSXElementName> {
        if let Some(name) = self.jsx_names.get(property) {
            return Some(name.clone());
        }
        let name = jsx_member_name(RUNTIME_BINDING, property)?;
        self.jsx_names.insert(property.to_string(), name.clone());
        Some(name)
    }

    /// Internal-namespace imports may be used before their declaration.
    fn collect_internal_names(&mut self, module: &Module) {
        for item in &module.body {
            let ModuleItem::ModuleDecl(ModuleDecl::Import(import)) = item else {
                continue;
            };
            if import.type_only || !is_internal_namespace(&import.src.value) {
                continue;
            }
            for binding in import_bindings(import) {
                if let ImportBinding::Named { imported, local } = binding {
                    self.state.internal_names.insert(local, imported);
                }
            }
        }
    }

    fn rewrite_module_decl(&mut self, decl: ModuleDecl) -> Vec<Stmt> {
        match decl {
            ModuleDecl::Import(import) => self.rewrite_import(&import),
            ModuleDecl::ExportDecl(export) => self.export_declaration(export.decl),
            ModuleDecl::ExportNamed(named) => self.rewrite_named_export(named),
            ModuleDecl::ExportDefaultDecl(default) => self.export_default_declaration(default.decl),
            ModuleDecl::ExportDefaultExpr(default) => {
                self.state.export_default(*default.expr);
                Vec::new()
            }
            ModuleDecl::ExportAll(all) => {
                if !all.type_only {
                    self.state.star_sources.push(all.src.value.to_string());
                }
                Vec::new()
            }
            ModuleDecl::TsImportEquals(decl) => self.rewrite_import_equals(*decl),
            ModuleDecl::TsExportAssignment(assign) => {
                self.state.export_default(*assign.expr);
                Vec::new()
            }
            ModuleDecl::TsNamespaceExport(_) => Vec::new(),
        }
    }

    fn rewrite_import(&mut self, import: &ImportDecl) -> Vec<Stmt> {
        if import.type_only {
            return Vec::new();
        }
        let bindings = import_bindings(import);
        match self.reference(&import.src.value) {
            ModuleReference::Internal => bindings
                .into_iter()
                .filter_map(|binding| match binding {
                    ImportBinding::Whole(local) => Some(build::const_decl(vec![build::declarator(
                        build::binding(&local),
                        Some(build::ident_expr(RUNTIME_BINDING)),
                    )])),
                    ImportBinding::Named { .. } => None,
                })
                .collect(),
            ModuleReference::Shim(target) => bind_shim(target, bindings),
            ModuleReference::File(path) => self.bind_module(build::await_require(&path), bindings),
            ModuleReference::Unresolved => Vec::new(),
        }
    }

    /// Reproduce the import's bindings against one required module.
    ///
    /// Several binding shapes share a temporary so the module is required once.
    fn bind_module(&mut self, source: Expr, bindings: Vec<ImportBinding>) -> Vec<Stmt> {
        let mut named = Vec::new();
        let mut wholes = Vec::new();
        for binding in bindings {
            match binding {
                ImportBinding::Named { imported, local } => named.push((imported, local)),
                ImportBinding::Whole(local) => wholes.push(local),
            }
        }

        let shapes = wholes.len() + usize::from(!named.is_empty());
        let decls = match shapes {
            0 => return vec![build::expr_stmt(source)],
            1 => {
                let name = match wholes.pop() {
                    Some(local) => build::binding(&local),
                    None => build::object_pattern(&named),
                };
                vec![build::declarator(name, Some(source))]
            }
            _ => {
                let temp = self.state.temp_binding();
                let mut decls = vec![build::declarator(build::binding(&temp), Some(source))];
                for local in &wholes {
                    decls.push(build::declarator(
                        build::binding(local),
                        Some(build::ident_expr(&temp)),
                    ));
                }
                if !named.is_empty() {
                    decls.push(build::declarator(
                        build::object_pattern(&named),
                        Some(build::ident_expr(&temp)),
                    ));
                }
                decls
            }
        };
        vec![build::const_decl(decls)]
    }

    fn export_declaration(&mut self, decl: Decl) -> Vec<Stmt> {
        let names: Vec<String> = match &decl {
            Decl::Class(class) if !class.declare => vec![class.ident.sym.to_string()],
            Decl::Fn(func) if !func.declare => vec![func.ident.sym.to_string()],
            Decl::Var(var) if !var.declare => var
                .decls
                .iter()
                .flat_map(|d| pattern_bindings(&d.name))
                .collect(),
            Decl::TsEnum(ts_enum) if !ts_enum.declare => vec![ts_enum.id.sym.to_string()],
            Decl::TsModule(ts_module) if !ts_module.declare => match &ts_module.id {
                TsModuleName::Ident(id) => vec![id.sym.to_string()],
                TsModuleName::Str(_) => Vec::new(),
            },
            _ => Vec::new(),
        };
        for name in names {
            let value = build::ident_expr(&name);
            self.state.export(&name, value);
        }
        vec![Stmt::Decl(decl)]
    }

    fn export_default_declaration(&mut self, decl: DefaultDecl) -> Vec<Stmt> {
        match decl {
            DefaultDecl::Fn(FnExpr {
                ident: Some(ident),
                function,
            }) => {
                self.state.export_default(build::ident_expr(&ident.sym));
                vec![Stmt::Decl(Decl::Fn(FnDecl {
                    ident,
                    declare: false,
                    function,
                }))]
            }
            DefaultDecl::Class(ClassExpr {
                ident: Some(ident),
                class,
            }) => {
                self.state.export_default(build::ident_expr(&ident.sym));
                vec![Stmt::Decl(Decl::Class(ClassDecl {
                    ident,
                    declare: false,
                    class,
                }))]
            }
            DefaultDecl::Fn(func) => {
                self.state.export_default(Expr::Fn(func));
                Vec::new()
            }
            DefaultDecl::Class(class) => {
                self.state.export_default(Expr::Class(class));
                Vec::new()
            }
            DefaultDecl::TsInterfaceDecl(interface) => vec![Stmt::Decl(Decl::TsInterface(interface))],
        }
    }

    fn rewrite_named_export(&mut self, export: NamedExport) -> Vec<Stmt> {
        if export.type_only {
            return Vec::new();
        }
        let specifiers: Vec<ExportSpecifier> = export
            .specifiers
            .into_iter()
            .filter(|s| !matches!(s, ExportSpecifier::Named(n) if n.is_type_only))
            .collect();

        let Some(src) = export.src else {
            for spec in specifiers {
                if let ExportSpecifier::Named(named) = spec {
                    let orig = build::export_name(&named.orig);
                    let exported = named.exported.as_ref().map_or_else(|| orig.clone(), build::export_name);
                    self.state.export(&exported, build::ident_expr(&orig));
                }
            }
            return Vec::new();
        };

        let mut prelude = Vec::new();
        let base = match self.reference(&src.value) {
            ModuleReference::Shim(target) => ReexportBase::Shim(target),
            ModuleReference::Internal => ReexportBase::Runtime,
            ModuleReference::File(path) => {
                let temp = self.state.temp_binding();
                prelude.push(build::const_decl(vec![build::declarator(
                    build::binding(&temp),
                    Some(build::await_require(&path)),
                )]));
                ReexportBase::Binding(temp)
            }
            ModuleReference::Unresolved => return Vec::new(),
        };

        for spec in specifiers {
            match spec {
                ExportSpecifier::Named(named) => {
                    let orig = build::export_name(&named.orig);
                    let exported = named.exported.as_ref().map_or_else(|| orig.clone(), build::export_name);
                    self.state.export(&exported, base.value(&orig));
                }
                ExportSpecifier::Namespace(ns) => {
                    self.state.export(&build::export_name(&ns.name), base.whole());
                }
                ExportSpecifier::Default(default) => {
                    self.state.export(&default.exported.sym, base.whole());
                }
            }
        }
        prelude
    }

    /// `import x = require("y")`
    fn rewrite_import_equals(&mut self, decl: TsImportEqualsDecl) -> Vec<Stmt> {
        if decl.is_type_only {
            return Vec::new();
        }
        let TsModuleRef::TsExternalModuleRef(external) = &decl.module_ref else {
            return Vec::new();
        };
        let value = self.require_value(&external.expr.value);
        if decl.is_export {
            self.state.export(&decl.id.sym, build::ident_expr(&decl.id.sym));
        }
        vec![build::const_decl(vec![build::declarator(
            build::binding(&decl.id.sym),
            Some(value),
        )])]
    }

    /// Lift a module-level `module.exports = x` / `exports.y = x` statement.
    fn lift_export_statement(&mut self, stmt: Stmt) -> Option<Stmt> {
        if self.state.exports_object {
            return Some(stmt);
        }
        let (span, expr) = match stmt {
            Stmt::Expr(ExprStmt { span, expr }) => (span, expr),
            other => return Some(other),
        };
        let assign = match *expr {
            Expr::Assign(assign) if assign.op == AssignOp::Assign => assign,
            other => {
                return Some(Stmt::Expr(ExprStmt {
                    span,
                    expr: Box::new(other),
                }))
            }
        };

        match commonjs::classify_assignment(&assign.left) {
            AssignmentShape::ModuleExportsAssign => {
                self.state.export_default(*assign.right);
                None
            }
            AssignmentShape::NamedExportAssign(name) => {
                if name != ES_MODULE_FLAG {
                    self.state.export(&name, *assign.right);
                }
                None
            }
            _ => Some(Stmt::Expr(ExprStmt {
                span,
                expr: Box::new(Expr::Assign(assign)),
            })),
        }
    }
}

impl VisitMut for ModuleRewriter<'_> {
    fn visit_mut_module(&mut self, module: &mut Module) {
        if self.ctx.second_pass {
            module.visit_mut_children_with(self);
            return;
        }

        self.collect_internal_names(module);

        let mut body = Vec::with_capacity(module.body.len());
        for item in std::mem::take(&mut module.body) {
            match item {
                ModuleItem::ModuleDecl(mut decl) => {
                    self.depth += 1;
                    decl.visit_mut_children_with(self);
                    self.depth -= 1;
                    body.extend(
                        self.rewrite_module_decl(decl)
                            .into_iter()
                            .map(ModuleItem::Stmt),
                    );
                }
                ModuleItem::Stmt(mut stmt) => {
                    stmt.visit_mut_with(self);
                    if let Some(stmt) = self.lift_export_statement(stmt) {
                        if !matches!(stmt, Stmt::Empty(_)) {
                            body.push(ModuleItem::Stmt(stmt));
                        }
                    }
                }
            }
        }
        module.body = body;
    }

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        stmts.visit_mut_children_with(self);
        if !self.ctx.second_pass {
            stmts.retain(|s| !matches!(s, Stmt::Empty(_)));
        }
    }

    fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
        if self.ctx.second_pass {
            stmt.visit_mut_children_with(self);
            return;
        }

        // A bare `require("x");` that resolves nowhere is dropped outright.
        if let Some(spec) = statement_require(stmt) {
            if self.reference(&spec) == ModuleReference::Unresolved {
                *stmt = Stmt::Empty(EmptyStmt { span: DUMMY_SP });
                return;
            }
        }

        let top_level = self.depth == 0;
        self.depth += 1;
        stmt.visit_mut_children_with(self);
        self.depth -= 1;

        let defined = match &*stmt {
            Stmt::Expr(ExprStmt { expr, .. }) => match &**expr {
                Expr::Call(call) => commonjs::defined_export(call),
                _ => None,
            },
            _ => None,
        };
        match defined {
            Some(DefinedExport::EsModuleFlag) => {
                *stmt = Stmt::Empty(EmptyStmt { span: DUMMY_SP });
            }
            Some(DefinedExport::Named { .. }) if self.state.exports_object => {}
            Some(DefinedExport::Named { name, value }) if top_level => {
                self.state.export(&name, value);
                *stmt = Stmt::Empty(EmptyStmt { span: DUMMY_SP });
            }
            // Nested definitions assign a local where they stand.
            Some(DefinedExport::Named { name, value }) => {
                let local = commonjs::named_export_local(&name);
                self.state.export_through_local(&name, &local);
                *stmt = build::expr_stmt(build::assign(&local, value));
            }
            None => {}
        }
    }

    fn visit_mut_var_decl(&mut self, decl: &mut VarDecl) {
        if !self.ctx.second_pass {
            split_shim_requires(decl);
        }
        decl.visit_mut_children_with(self);
    }

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        if self.ctx.second_pass {
            if self.state.exports_object {
                commonjs::rewrite_exports_object_use(expr);
            } else {
                commonjs::rewrite_export_assignment(expr, self.state);
            }
            return;
        }

        let Expr::Call(call) = expr else {
            return;
        };
        if let Some(spec) = commonjs::require_specifier(call) {
            *expr = self.require_value(&spec);
            return;
        }
        self.rewrite_internal_call(call);
    }

    fn visit_mut_jsx_element_name(&mut self, name: &mut JSXElementName) {
        if self.ctx.second_pass {
            return;
        }
        let JSXElementName::Ident(id) = name else {
            return;
        };
        let Some(imported) = self.state.internal_names.get(&*id.sym).cloned() else {
            return;
        };
        if let Some(member) = self.jsx_member(&imported) {
            *name = member;
        }
    }
}

impl ModuleRewriter<'_> {
    /// `Callout(...)` imported from the internal namespace becomes `dc.Callout(...)`.
    fn rewrite_internal_call(&mut self, call: &mut CallExpr) {
        let Callee::Expr(callee) = &mut call.callee else {
            return;
        };
        let Expr::Ident(id) = &**callee else {
            return;
        };
        if let Some(imported) = self.state.internal_names.get(&*id.sym) {
            **callee = build::runtime_member(imported);
        }
    }
}

fn import_bindings(import: &ImportDecl) -> Vec<ImportBinding> {
    import
        .specifiers
        .iter()
        .filter_map(|spec| match spec {
            ImportSpecifier::Named(named) if named.is_type_only => None,
            ImportSpecifier::Named(named) => {
                let local = named.local.sym.to_string();
                let imported = named
                    .imported
                    .as_ref()
                    .map_or_else(|| local.clone(), build::export_name);
                if imported == "default" {
                    Some(ImportBinding::Whole(local))
                } else {
                    Some(ImportBinding::Named { imported, local })
                }
            }
            ImportSpecifier::Default(default) => {
                Some(ImportBinding::Whole(default.local.sym.to_string()))
            }
            ImportSpecifier::Namespace(ns) => Some(ImportBinding::Whole(ns.local.sym.to_string())),
        })
        .collect()
}

/// Bind shimmed imports: hooks from `dc.hooks`, everything else from the shim's object.
fn bind_shim(target: ShimTarget, bindings: Vec<ImportBinding>) -> Vec<Stmt> {
    let mut hooks = Vec::new();
    let mut others = Vec::new();
    let mut decls = Vec::new();

    for binding in bindings {
        match binding {
            ImportBinding::Whole(local) => decls.push(build::declarator(
                build::binding(&local),
                Some(build::runtime_member(target.property_for(None))),
            )),
            ImportBinding::Named { imported, local } => {
                if target.property_for(Some(&imported)) == HOOKS_PROPERTY {
                    hooks.push((imported, local));
                } else {
                    others.push((imported, local));
                }
            }
        }
    }

    if !hooks.is_empty() {
        decls.push(build::declarator(
            build::object_pattern(&hooks),
            Some(build::runtime_member(HOOKS_PROPERTY)),
        ));
    }
    if !others.is_empty() {
        decls.push(build::declarator(
            build::object_pattern(&others),
            Some(build::runtime_member(target.property_for(None))),
        ));
    }

    if decls.is_empty() {
        Vec::new()
    } else {
        vec![build::const_decl(decls)]
    }
}

/// Split `const { useState, h } = require("react")` between hooks and components.
fn split_shim_requires(decl: &mut VarDecl) {
    let mut out = Vec::with_capacity(decl.decls.len());
    for declarator in decl.decls.drain(..) {
        let target = match declarator.init.as_deref() {
            Some(Expr::Call(call)) => commonjs::require_specifier(call).and_then(|s| runtime_shim(&s)),
            _ => None,
        };
        match (target, &declarator.name) {
            (Some(ShimTarget::Ui), Pat::Object(pattern)) => {
                out.extend(split_hook_pattern(pattern));
            }
            _ => out.push(declarator),
        }
    }
    decl.decls = out;
}

fn split_hook_pattern(pattern: &ObjectPat) -> Vec<VarDeclarator> {
    let (hooks, others): (Vec<ObjectPatProp>, Vec<ObjectPatProp>) = pattern
        .props
        .iter()
        .cloned()
        .partition(|prop| pattern_key(prop).is_some_and(|key| is_hook_name(&key)));

    [(hooks, HOOKS_PROPERTY), (others, UI_PROPERTY)]
        .into_iter()
        .filter(|(props, _)| !props.is_empty())
        .map(|(props, property)| {
            let name = Pat::Object(ObjectPat {
                props,
                ..pattern.clone()
            });
            build::declarator(name, Some(build::runtime_member(property)))
        })
        .collect()
}

fn pattern_key(prop: &ObjectPatProp) -> Option<String> {
    match prop {
        ObjectPatProp::KeyValue(kv) => match &kv.key {
            PropName::Ident(id) => Some(id.sym.to_string()),
            PropName::Str(s) => Some(s.value.to_string()),
            _ => None,
        },
        ObjectPatProp::Assign(assign) => Some(assign.key.sym.to_string()),
        ObjectPatProp::Rest(_) => None,
    }
}

/// Every name a binding pattern introduces.
fn pattern_bindings(pat: &Pat) -> Vec<String> {
    match pat {
        Pat::Ident(id) => vec![id.id.sym.to_string()],
        Pat::Array(array) => array.elems.iter().flatten().flat_map(pattern_bindings).collect(),
        Pat::Object(object) => object
            .props
            .iter()
            .flat_map(|prop| match prop {
                ObjectPatProp::KeyValue(kv) => pattern_bindings(&kv.value),
                ObjectPatProp::Assign(assign) => vec![assign.key.sym.to_string()],
                ObjectPatProp::Rest(rest) => pattern_bindings(&rest.arg),
            })
            .collect(),
        Pat::Rest(rest) => pattern_bindings(&rest.arg),
        Pat::Assign(assign) => pattern_bindings(&assign.left),
        Pat::Invalid(_) | Pat::Expr(_) => Vec::new(),
    }
}

fn statement_require(stmt: &Stmt) -> Option<String> {
    let Stmt::Expr(ExprStmt { expr, .. }) = stmt else {
        return None;
    };
    match &**expr {
        Expr::Call(call) => commonjs::require_specifier(call),
        _ => None,
    }
}
