//! `scriptbridge transform` command implementation.

use miette::{miette, IntoDiagnostic, Result};
use scriptbridge_core::{vpath, Config, Diagnostic, DiskFs, VirtualFs};
use scriptbridge_core::TransformOutput;
use scriptbridge_worker::{ScriptBridge, WorkerError};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Transform result for JSON output.
#[derive(Serialize)]
struct TransformResult {
    ok: bool,
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    out: Option<PathBuf>,
    diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(config: Config, file: &str, out: Option<&Path>, json: bool) -> Result<()> {
    let file = vpath::normalize(file);
    let vfs = DiskFs::new(config.vault_root.clone());
    let source = vfs
        .read_to_string(&file)
        .map_err(|e| miette!("failed to read {file}: {e}"))?;

    let runtime = super::runtime()?;
    let output = match runtime.block_on(pre_transform(config, &file, &source)) {
        Ok(output) => output,
        Err(e) => {
            if json {
                super::print_json(&TransformResult {
                    ok: false,
                    file,
                    code: None,
                    out: None,
                    diagnostics: Vec::new(),
                    error: Some(e.to_string()),
                })?;
            } else {
                eprintln!("error: {e}");
            }
            std::process::exit(1);
        }
    };

    if let Some(out) = out {
        std::fs::write(out, &output.code).into_diagnostic()?;
    }

    if json {
        return super::print_json(&TransformResult {
            ok: true,
            file,
            code: out.is_none().then(|| output.code.clone()),
            out: out.map(Path::to_path_buf),
            diagnostics: output.diagnostics,
            error: None,
        });
    }

    for diagnostic in &output.diagnostics {
        eprintln!("{diagnostic}");
    }
    if out.is_none() {
        print!("{}", output.code);
    }
    Ok(())
}

async fn pre_transform(config: Config, file: &str, source: &str) -> Result<TransformOutput, WorkerError> {
    let bridge = ScriptBridge::from_config(config)?;
    let output = bridge.pre_transform(file, source).await;
    bridge.shutdown();
    output
}
