//! Import discovery for script files.
//!
//! Finds the bare package specifiers a file imports at module level, so the
//! packages behind them can be materialized before the file is transformed.

mod scan;

pub use scan::{extract_bare_imports, kinds, BareImport};
