//! CommonJS export detection.
//!
//! Export assignments are recognized by the shape of their left-hand side
//! alone, so a local variable that happens to be called `exports` is treated
//! like the real thing.
//!
//! A module that only assigns to its exports has them lifted into export
//! records. A module that also reads them back gets a real object instead:
//! every use of `exports` and `module.exports` is pointed at a synthesized
//! local, which the module returns.

use swc_ecma_ast::{
    AssignExpr, AssignOp, AssignTarget, CallExpr, Callee, Expr, FnExpr, Lit, MemberExpr,
    MemberProp, Module, Prop, PropName, PropOrSpread, SimpleAssignTarget,
};
use swc_ecma_visit::{Visit, VisitWith};

use super::build;
use super::diagnostic::{codes, Diagnostic};
use super::exports::{TransformState, MODULE_EXPORTS_BINDING, NAMED_EXPORT_PREFIX};

/// Interop flag transpilers set on CommonJS output.
pub(crate) const ES_MODULE_FLAG: &str = "__esModule";

/// What an assignment's target means for the module's exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AssignmentShape {
    /// `module.exports = x`
    ModuleExportsAssign,
    /// `exports.name = x`, `module.exports.name = x`, `exports["name"] = x`
    NamedExportAssign(String),
    /// `exports = x`
    ExportsRebind,
    /// `exports.a.b = x`, `module.exports[key] = x`
    AmbiguousExportChain,
    PlainAssignment,
}

pub(crate) fn classify_assignment(target: &AssignTarget) -> AssignmentShape {
    let member = match target {
        AssignTarget::Simple(SimpleAssignTarget::Member(member)) => member,
        AssignTarget::Simple(SimpleAssignTarget::Ident(id)) if &*id.id.sym == "exports" => {
            return AssignmentShape::ExportsRebind;
        }
        _ => return AssignmentShape::PlainAssignment,
    };

    if is_module_exports(member) {
        return AssignmentShape::ModuleExportsAssign;
    }
    if is_exports_object(&member.obj) {
        return match static_property(&member.prop) {
            Some(name) => AssignmentShape::NamedExportAssign(name),
            None => AssignmentShape::AmbiguousExportChain,
        };
    }
    if rooted_at_exports(&member.obj) {
        AssignmentShape::AmbiguousExportChain
    } else {
        AssignmentShape::PlainAssignment
    }
}

fn is_module_exports(member: &MemberExpr) -> bool {
    matches!(&*member.obj, Expr::Ident(id) if &*id.sym == "module")
        && static_property(&member.prop).as_deref() == Some("exports")
}

/// `exports` or `module.exports`.
fn is_exports_object(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(id) => &*id.sym == "exports",
        Expr::Member(member) => is_module_exports(member),
        _ => false,
    }
}

fn rooted_at_exports(expr: &Expr) -> bool {
    match expr {
        Expr::Member(member) => is_exports_object(&member.obj) || rooted_at_exports(&member.obj),
        _ => is_exports_object(expr),
    }
}

fn static_property(prop: &MemberProp) -> Option<String> {
    match prop {
        MemberProp::Ident(name) => Some(name.sym.to_string()),
        MemberProp::Computed(computed) => match &*computed.expr {
            Expr::Lit(Lit::Str(s)) => Some(s.value.to_string()),
            _ => None,
        },
        MemberProp::PrivateName(_) => None,
    }
}

/// The specifier of a `require("...")` call.
pub(crate) fn require_specifier(call: &CallExpr) -> Option<String> {
    let Callee::Expr(callee) = &call.callee else {
        return None;
    };
    if !matches!(&**callee, Expr::Ident(id) if &*id.sym == "require") || call.args.len() != 1 {
        return None;
    }
    let arg = &call.args[0];
    if arg.spread.is_some() {
        return None;
    }
    match &*arg.expr {
        Expr::Lit(Lit::Str(s)) => Some(s.value.to_string()),
        Expr::Tpl(tpl) if tpl.exprs.is_empty() => {
            tpl.quasis.first()?.cooked.as_ref().map(ToString::to_string)
        }
        _ => None,
    }
}

/// An export declared through `Object.defineProperty(exports, ...)`.
#[derive(Debug)]
pub(crate) enum DefinedExport {
    EsModuleFlag,
    Named { name: String, value: Expr },
}

/// Match `Object.defineProperty(exports, "name", { value | get })`.
///
/// A getter is exported as the result of calling it once.
pub(crate) fn defined_export(call: &CallExpr) -> Option<DefinedExport> {
    let Callee::Expr(callee) = &call.callee else {
        return None;
    };
    let Expr::Member(member) = &**callee else {
        return None;
    };
    if !matches!(&*member.obj, Expr::Ident(id) if &*id.sym == "Object")
        || static_property(&member.prop).as_deref() != Some("defineProperty")
        || call.args.len() < 3
        || call.args.iter().any(|a| a.spread.is_some())
    {
        return None;
    }
    if !is_exports_object(&call.args[0].expr) {
        return None;
    }
    let Expr::Lit(Lit::Str(name)) = &*call.args[1].expr else {
        return None;
    };
    let name = name.value.to_string();
    if name == ES_MODULE_FLAG {
        return Some(DefinedExport::EsModuleFlag);
    }
    let Expr::Object(descriptor) = &*call.args[2].expr else {
        return None;
    };

    let mut value = None;
    for prop in &descriptor.props {
        let PropOrSpread::Prop(prop) = prop else {
            continue;
        };
        match &**prop {
            Prop::KeyValue(kv) if key_is(&kv.key, "value") => value = Some((*kv.value).clone()),
            Prop::KeyValue(kv) if key_is(&kv.key, "get") => {
                value = Some(build::call((*kv.value).clone(), Vec::new()));
            }
            Prop::Method(method) if key_is(&method.key, "get") => {
                let getter = Expr::Fn(FnExpr {
                    ident: None,
                    function: method.function.clone(),
                });
                value = Some(build::call(getter, Vec::new()));
            }
            _ => {}
        }
    }

    Some(DefinedExport::Named {
        name,
        value: value.unwrap_or_else(build::undefined),
    })
}

fn key_is(key: &PropName, expected: &str) -> bool {
    match key {
        PropName::Ident(id) => &*id.sym == expected,
        PropName::Str(s) => &*s.value == expected,
        _ => false,
    }
}

/// The local standing in for `exports.<name>`.
pub(crate) fn named_export_local(name: &str) -> String {
    format!("{NAMED_EXPORT_PREFIX}{}", build::sanitize(name))
}

/// Whether `module` reads its exports object anywhere, not only assigns to it.
///
/// Compound assignments (`exports.n += 1`) count as reads. Ambiguous member
/// chains are left to their diagnostic and do not count.
pub(crate) fn reads_exports_object(module: &Module) -> bool {
    let mut finder = ExportsReadFinder { found: false };
    module.visit_with(&mut finder);
    finder.found
}

struct ExportsReadFinder {
    found: bool,
}

impl Visit for ExportsReadFinder {
    fn visit_assign_expr(&mut self, assign: &AssignExpr) {
        let writes_export = assign.op == AssignOp::Assign
            && classify_assignment(&assign.left) != AssignmentShape::PlainAssignment;
        if writes_export {
            assign.right.visit_with(self);
        } else {
            assign.visit_children_with(self);
        }
    }

    fn visit_call_expr(&mut self, call: &CallExpr) {
        if defined_export(call).is_some() {
            for arg in call.args.iter().skip(1) {
                arg.visit_with(self);
            }
        } else {
            call.visit_children_with(self);
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        if self.found {
            return;
        }
        if is_exports_object(expr) {
            self.found = true;
            return;
        }
        expr.visit_children_with(self);
    }
}

/// Point a use of the exports object at [`MODULE_EXPORTS_BINDING`].
///
/// Runs after the expression's children, so `exports.a` has already become
/// `__module_exports.a`. `module.exports = x` rebinds the object; `exports = x`
/// only rebinds a local alias and is reduced to `x`.
pub(crate) fn rewrite_exports_object_use(expr: &mut Expr) {
    if is_exports_object(expr) {
        *expr = build::ident_expr(MODULE_EXPORTS_BINDING);
        return;
    }
    let Expr::Assign(assign) = expr else {
        return;
    };
    if assign.op != AssignOp::Assign {
        return;
    }
    match classify_assignment(&assign.left) {
        AssignmentShape::ModuleExportsAssign => {
            assign.left = build::assign_target(MODULE_EXPORTS_BINDING);
        }
        AssignmentShape::ExportsRebind => {
            let right = std::mem::replace(&mut assign.right, Box::new(build::undefined()));
            *expr = *right;
        }
        _ => {}
    }
}

/// Rewrite an export-shaped assignment to target a synthesized local.
///
/// `exports.foo = x` becomes `__exports_foo = x` and `foo` is recorded as an
/// export of that local; `module.exports = x` becomes `__module_exports = x`
/// and is recorded as the default. Only the first assignment to a local
/// records it.
pub(crate) fn rewrite_export_assignment(expr: &mut Expr, state: &mut TransformState) {
    let Expr::Assign(assign) = expr else {
        return;
    };

    match classify_assignment(&assign.left) {
        AssignmentShape::ModuleExportsAssign => {
            if state.declare_export_binding(MODULE_EXPORTS_BINDING) {
                state.export_default(build::ident_expr(MODULE_EXPORTS_BINDING));
            }
            assign.left = build::assign_target(MODULE_EXPORTS_BINDING);
        }
        AssignmentShape::NamedExportAssign(name) if name != ES_MODULE_FLAG => {
            let local = named_export_local(&name);
            state.export_through_local(&name, &local);
            assign.left = build::assign_target(&local);
        }
        AssignmentShape::NamedExportAssign(_) | AssignmentShape::ExportsRebind => {
            let right = std::mem::replace(&mut assign.right, Box::new(build::undefined()));
            *expr = *right;
        }
        AssignmentShape::AmbiguousExportChain => {
            let diag = Diagnostic::warning(
                "Ambiguous CommonJS export: member chain below the exports object left untouched",
            )
            .with_code(codes::AMBIGUOUS_EXPORT)
            .with_file(state.file());
            state.diagnostics.push(diag);
        }
        AssignmentShape::PlainAssignment => {}
    }
}
