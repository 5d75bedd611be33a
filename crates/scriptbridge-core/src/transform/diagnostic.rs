//! Transform diagnostics and errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic and error codes.
pub mod codes {
    /// The source could not be parsed even with recovery.
    pub const TRANSFORM_PARSE_ERROR: &str = "TRANSFORM_PARSE_ERROR";
    /// Code generation failed.
    pub const TRANSFORM_EMIT_ERROR: &str = "TRANSFORM_EMIT_ERROR";
    /// A specifier matched no file; its import was dropped.
    pub const UNRESOLVED_SPECIFIER: &str = "UNRESOLVED_SPECIFIER";
    /// A CommonJS member chain too deep to classify was left untouched.
    pub const AMBIGUOUS_EXPORT: &str = "AMBIGUOUS_EXPORT";
    /// The parser recovered from a syntax error.
    pub const RECOVERED_SYNTAX: &str = "RECOVERED_SYNTAX";
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Info,
    Warning,
    Error,
}

impl DiagnosticSeverity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A non-fatal finding reported alongside transformed code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    /// Vault-relative path of the file being transformed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number (1-indexed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Column number (1-indexed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl Diagnostic {
    fn new(severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, message)
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, message)
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Info, message)
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Whether this diagnostic carries `code`.
    #[must_use]
    pub fn is(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity.as_str(), self.message)?;
        match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(col)) => write!(f, " at {file}:{line}:{col}"),
            (Some(file), _, _) => write!(f, " in {file}"),
            _ => Ok(()),
        }
    }
}

/// A file could not be transformed at all.
#[derive(Debug, Clone)]
pub struct TransformError {
    pub code: &'static str,
    pub message: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl TransformError {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(codes::TRANSFORM_PARSE_ERROR, message)
    }

    #[must_use]
    pub fn emit_error(message: impl Into<String>) -> Self {
        Self::new(codes::TRANSFORM_EMIT_ERROR, message)
    }

    /// Whether the source was unparseable (the file is skipped, not fatal).
    #[must_use]
    pub fn is_parse_failure(&self) -> bool {
        self.code == codes::TRANSFORM_PARSE_ERROR
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for diag in &self.diagnostics {
            write!(f, "\n  - {diag}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TransformError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::warning("Unresolved import './x'")
            .with_code(codes::UNRESOLVED_SPECIFIER)
            .with_file("scripts/a.js");
        assert!(diag.is(codes::UNRESOLVED_SPECIFIER));
        assert_eq!(diag.to_string(), "warning: Unresolved import './x' in scripts/a.js");

        let located = Diagnostic::error("Unexpected token")
            .with_file("a.js")
            .with_location(3, 7);
        assert_eq!(located.to_string(), "error: Unexpected token at a.js:3:7");
    }

    #[test]
    fn test_diagnostic_serializes_lowercase_severity() {
        let json = serde_json::to_value(Diagnostic::info("note")).unwrap();
        assert_eq!(json["severity"], "info");
        assert!(json.get("code").is_none());
    }

    #[test]
    fn test_transform_error_display() {
        let err = TransformError::parse_error("Failed to parse")
            .with_diagnostics(vec![Diagnostic::error("Expected ';'")]);
        assert!(err.is_parse_failure());
        assert_eq!(
            err.to_string(),
            "TRANSFORM_PARSE_ERROR: Failed to parse\n  - error: Expected ';'"
        );
    }
}
