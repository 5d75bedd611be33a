//! Parsing and code generation with swc.

use swc_common::{
    comments::SingleThreadedComments, sync::Lrc, FileName, Globals, SourceMap, Span, Spanned,
    DUMMY_SP, GLOBALS,
};
use swc_ecma_ast::{EsVersion, Expr, JSXElementName, Module, ModuleItem, Stmt};
use swc_ecma_codegen::{text_writer::JsWriter, Emitter};
use swc_ecma_parser::{
    error::SyntaxError, lexer::Lexer, Parser, StringInput, Syntax, TsSyntax,
};
use swc_ecma_transforms_base::fixer::fixer;
use swc_ecma_visit::{FoldWith, VisitMut, VisitMutWith};

use super::diagnostic::{codes, Diagnostic, TransformError};

/// A parsed module plus what is needed to print it again.
pub(crate) struct ParsedModule {
    pub module: Module,
    pub cm: Lrc<SourceMap>,
    pub comments: SingleThreadedComments,
    /// Syntax errors the parser recovered from.
    pub recovered: Vec<Diagnostic>,
}

/// Grammar for a file: TypeScript with JSX, except `.ts` files where
/// angle brackets are casts. Declaration files parse in `dts` mode.
pub(crate) fn syntax_for(file_path: &str) -> Syntax {
    let lower = file_path.to_ascii_lowercase();
    let dts = [".d.ts", ".d.mts", ".d.cts"].iter().any(|ext| lower.ends_with(ext));
    let plain_ts = [".ts", ".mts", ".cts"].iter().any(|ext| lower.ends_with(ext));
    Syntax::Typescript(TsSyntax {
        tsx: !plain_ts,
        decorators: true,
        dts,
        ..Default::default()
    })
}

/// Parse `source` as a module.
///
/// Recoverable syntax errors are returned as warnings; an error the parser
/// cannot recover from fails the whole file. Sandbox scripts may `return`
/// at top level, so that error is not reported.
pub(crate) fn parse_module(source: &str, file_path: &str) -> Result<ParsedModule, TransformError> {
    let cm: Lrc<SourceMap> = Lrc::default();
    let fm = cm.new_source_file(
        Lrc::new(FileName::Custom(file_path.to_string())),
        source.to_string(),
    );
    let comments = SingleThreadedComments::default();

    let lexer = Lexer::new(
        syntax_for(file_path),
        EsVersion::EsNext,
        StringInput::from(&*fm),
        Some(&comments),
    );
    let mut parser = Parser::new_from(lexer);

    let module = parser.parse_module().map_err(|e| {
        let diag = Diagnostic::error(format!("{:?}", e.kind()))
            .with_code(codes::TRANSFORM_PARSE_ERROR)
            .with_file(file_path);
        TransformError::parse_error(format!("Failed to parse {file_path}"))
            .with_diagnostics(vec![at_span(diag, &cm, e.span())])
    })?;

    let recovered = parser
        .take_errors()
        .into_iter()
        .filter(|e| !matches!(e.kind(), SyntaxError::ReturnNotAllowed))
        .map(|e| {
            let diag = Diagnostic::warning(format!("{:?}", e.kind()))
                .with_code(codes::RECOVERED_SYNTAX)
                .with_file(file_path);
            at_span(diag, &cm, e.span())
        })
        .collect();

    Ok(ParsedModule {
        module,
        cm,
        comments,
        recovered,
    })
}

fn at_span(diag: Diagnostic, cm: &SourceMap, span: Span) -> Diagnostic {
    let loc = cm.lookup_char_pos(span.lo);
    let line = u32::try_from(loc.line).unwrap_or(u32::MAX);
    let column = u32::try_from(loc.col_display + 1).unwrap_or(u32::MAX);
    diag.with_location(line, column)
}

/// Print a module, inserting whatever parentheses the rewrites made necessary.
pub(crate) fn emit_module(parsed: ParsedModule) -> Result<String, TransformError> {
    let ParsedModule {
        module, cm, comments, ..
    } = parsed;

    let module = GLOBALS.set(&Globals::default(), || module.fold_with(&mut fixer(Some(&comments))));

    let mut buf = Vec::new();
    {
        let writer = JsWriter::new(cm.clone(), "\n", &mut buf, None);
        let mut emitter = Emitter {
            cfg: swc_ecma_codegen::Config::default().with_target(EsVersion::EsNext),
            cm: cm.clone(),
            comments: Some(&comments),
            wr: writer,
        };
        emitter
            .emit_module(&module)
            .map_err(|e| TransformError::emit_error(format!("Failed to emit: {e}")))?;
    }

    String::from_utf8(buf)
        .map_err(|e| TransformError::emit_error(format!("Invalid UTF-8 output: {e}")))
}

/// Build the JSX tag name `<object.property>` by parsing it.
pub(crate) fn jsx_member_name(object: &str, property: &str) -> Option<JSXElementName> {
    let snippet = format!("<{object}.{property} />;");
    let parsed = parse_module(&snippet, "tag.tsx").ok()?;
    let ModuleItem::Stmt(Stmt::Expr(stmt)) = parsed.module.body.into_iter().next()? else {
        return None;
    };
    let Expr::JSXElement(element) = *stmt.expr else {
        return None;
    };
    let mut name = element.opening.name;
    name.visit_mut_with(&mut EraseSpans);
    Some(name)
}

/// Spans from a scratch source map would collide with the real file's comments.
struct EraseSpans;

impl VisitMut for EraseSpans {
    fn visit_mut_span(&mut self, span: &mut Span) {
        *span = DUMMY_SP;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_per_extension() {
        let Syntax::Typescript(ts) = syntax_for("lib/index.ts") else {
            panic!("expected typescript syntax");
        };
        assert!(!ts.tsx);
        assert!(!ts.dts);

        let Syntax::Typescript(ts) = syntax_for("lib/index.d.ts") else {
            panic!("expected typescript syntax");
        };
        assert!(ts.dts);

        let Syntax::Typescript(ts) = syntax_for("view.jsx") else {
            panic!("expected typescript syntax");
        };
        assert!(ts.tsx);
    }

    #[test]
    fn test_round_trip_keeps_comments() {
        let parsed = parse_module("// note\nconst a = 1;\n", "a.js").unwrap();
        assert!(parsed.recovered.is_empty());
        let code = emit_module(parsed).unwrap();
        assert!(code.contains("// note"));
        assert!(code.contains("const a = 1;"));
    }

    #[test]
    fn test_top_level_return_is_not_reported() {
        let parsed = parse_module("const x = 1;\nreturn x;\n", "view.jsx").unwrap();
        assert!(parsed.recovered.is_empty(), "{:?}", parsed.recovered);
        let code = emit_module(parsed).unwrap();
        assert!(code.contains("return x;"));
    }

    #[test]
    fn test_unparseable_source_fails() {
        let err = parse_module("const x = (", "broken.js").err().unwrap();
        assert!(err.is_parse_failure());
        assert_eq!(err.diagnostics.len(), 1);
        assert_eq!(err.diagnostics[0].line, Some(1));
    }

    #[test]
    fn test_jsx_member_name() {
        let name = jsx_member_name("dc", "Callout").unwrap();
        assert!(matches!(name, JSXElementName::JSXMemberExpr(_)));
    }
}
