//! Small AST constructors for the nodes the rewrites emit.

use swc_common::{SyntaxContext, DUMMY_SP};
use swc_ecma_ast::{
    AssignExpr, AssignOp, AssignTarget, AwaitExpr, BindingIdent, CallExpr, Callee, Decl, Expr, ExprOrSpread, ExprStmt,
    Ident, IdentName, KeyValuePatProp, KeyValueProp, Lit, MemberExpr, MemberProp, ModuleExportName,
    ObjectLit, ObjectPat, ObjectPatProp, Pat, Prop, PropName, PropOrSpread, ReturnStmt,
    SimpleAssignTarget, SpreadElement, Stmt, Str, VarDecl, VarDeclKind, VarDeclarator,
};

use super::shims::{REQUIRE_PROPERTY, RUNTIME_BINDING};

pub(crate) fn ident(name: &str) -> Ident {
    Ident::new_no_ctxt(name.into(), DUMMY_SP)
}

pub(crate) fn ident_expr(name: &str) -> Expr {
    Expr::Ident(ident(name))
}

pub(crate) fn member(obj: Expr, prop: &str) -> Expr {
    Expr::Member(MemberExpr {
        span: DUMMY_SP,
        obj: Box::new(obj),
        prop: MemberProp::Ident(IdentName::new(prop.into(), DUMMY_SP)),
    })
}

/// `dc.<prop>`
pub(crate) fn runtime_member(prop: &str) -> Expr {
    member(ident_expr(RUNTIME_BINDING), prop)
}

pub(crate) fn string(value: &str) -> Str {
    Str {
        span: DUMMY_SP,
        value: value.into(),
        raw: None,
    }
}

pub(crate) fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call(CallExpr {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        callee: Callee::Expr(Box::new(callee)),
        args: args
            .into_iter()
            .map(|arg| ExprOrSpread {
                spread: None,
                expr: Box::new(arg),
            })
            .collect(),
        type_args: None,
    })
}

/// `await dc.require("<path>")`
pub(crate) fn await_require(path: &str) -> Expr {
    Expr::Await(AwaitExpr {
        span: DUMMY_SP,
        arg: Box::new(call(
            runtime_member(REQUIRE_PROPERTY),
            vec![Expr::Lit(Lit::Str(string(path)))],
        )),
    })
}

pub(crate) fn undefined() -> Expr {
    ident_expr("undefined")
}

pub(crate) fn binding(name: &str) -> Pat {
    Pat::Ident(BindingIdent::from(ident(name)))
}

/// `{ imported: local, ... }`
pub(crate) fn object_pattern(pairs: &[(String, String)]) -> Pat {
    Pat::Object(ObjectPat {
        span: DUMMY_SP,
        props: pairs
            .iter()
            .map(|(imported, local)| {
                ObjectPatProp::KeyValue(KeyValuePatProp {
                    key: prop_name(imported),
                    value: Box::new(binding(local)),
                })
            })
            .collect(),
        optional: false,
        type_ann: None,
    })
}

pub(crate) fn declarator(name: Pat, init: Option<Expr>) -> VarDeclarator {
    VarDeclarator {
        span: DUMMY_SP,
        name,
        init: init.map(Box::new),
        definite: false,
    }
}

pub(crate) fn var_decl(kind: VarDeclKind, decls: Vec<VarDeclarator>) -> Stmt {
    Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        kind,
        declare: false,
        decls,
    })))
}

pub(crate) fn const_decl(decls: Vec<VarDeclarator>) -> Stmt {
    var_decl(VarDeclKind::Const, decls)
}

pub(crate) fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr: Box::new(expr),
    })
}

pub(crate) fn return_stmt(expr: Expr) -> Stmt {
    Stmt::Return(ReturnStmt {
        span: DUMMY_SP,
        arg: Some(Box::new(expr)),
    })
}

pub(crate) fn object(props: Vec<PropOrSpread>) -> Expr {
    Expr::Object(ObjectLit {
        span: DUMMY_SP,
        props,
    })
}

pub(crate) fn key_value(key: &str, value: Expr) -> PropOrSpread {
    PropOrSpread::Prop(Box::new(Prop::KeyValue(KeyValueProp {
        key: prop_name(key),
        value: Box::new(value),
    })))
}

pub(crate) fn spread(expr: Expr) -> PropOrSpread {
    PropOrSpread::Spread(SpreadElement {
        dot3_token: DUMMY_SP,
        expr: Box::new(expr),
    })
}

/// An identifier key when `name` is a valid identifier, a string key otherwise.
pub(crate) fn prop_name(name: &str) -> PropName {
    if is_identifier(name) {
        PropName::Ident(IdentName::new(name.into(), DUMMY_SP))
    } else {
        PropName::Str(string(name))
    }
}

pub(crate) fn assign_target(name: &str) -> AssignTarget {
    AssignTarget::Simple(SimpleAssignTarget::Ident(BindingIdent::from(ident(name))))
}

/// `name = value`
pub(crate) fn assign(name: &str, value: Expr) -> Expr {
    Expr::Assign(AssignExpr {
        span: DUMMY_SP,
        op: AssignOp::Assign,
        left: assign_target(name),
        right: Box::new(value),
    })
}

pub(crate) fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(id) => id.sym.to_string(),
        ModuleExportName::Str(s) => s.value.to_string(),
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Replace every character that cannot appear in an identifier with `_`.
pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect()
}
