pub mod add;
pub mod cache;
pub mod resolve;
pub mod transform;
pub mod version;

use miette::{IntoDiagnostic, Result};
use serde::Serialize;

/// Print a JSON result on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

/// A tokio runtime for commands that talk to the worker.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().into_diagnostic()
}
