//! `scriptbridge add` command implementation.

use miette::{miette, Result};
use scriptbridge_core::pkg::PackageSpec;
use scriptbridge_core::Config;
use scriptbridge_worker::{ScriptBridge, WorkerError};
use serde::Serialize;

#[derive(Serialize)]
struct AddedInfo {
    name: String,
    version: String,
    dependencies: Vec<String>,
}

#[derive(Serialize)]
struct AddErrorInfo {
    spec: String,
    code: String,
    message: String,
}

/// Add result for JSON output.
#[derive(Serialize)]
struct AddResult {
    ok: bool,
    added: Vec<AddedInfo>,
    errors: Vec<AddErrorInfo>,
}

pub fn run(config: Config, specs: &[String], json: bool) -> Result<()> {
    let runtime = super::runtime()?;
    let result = runtime
        .block_on(add_all(config, specs))
        .map_err(|e| miette!("{e}"))?;

    if json {
        super::print_json(&result)?;
    } else {
        for added in &result.added {
            println!("added {}@{}", added.name, added.version);
            for dep in &added.dependencies {
                println!("  {dep}");
            }
        }
        for error in &result.errors {
            eprintln!("error: {}: {} ({})", error.spec, error.message, error.code);
        }
    }

    if !result.ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn add_all(config: Config, specs: &[String]) -> Result<AddResult, WorkerError> {
    let bridge = ScriptBridge::from_config(config)?;
    let mut added = Vec::new();
    let mut errors = Vec::new();

    for spec in specs {
        let parsed = match PackageSpec::parse(spec) {
            Ok(parsed) => parsed,
            Err(e) => {
                errors.push(AddErrorInfo {
                    spec: spec.clone(),
                    code: e.code().to_string(),
                    message: e.message().to_string(),
                });
                continue;
            }
        };

        match bridge
            .add_package(&parsed.name, parsed.requested_version())
            .await
        {
            Ok(package) => added.push(AddedInfo {
                name: parsed.name,
                version: package.version,
                dependencies: package.dependencies,
            }),
            Err(e @ (WorkerError::Fatal(_) | WorkerError::Dead | WorkerError::Shutdown)) => {
                bridge.shutdown();
                return Err(e);
            }
            Err(e) => errors.push(AddErrorInfo {
                spec: spec.clone(),
                code: e.code().unwrap_or("ADD_FAILED").to_string(),
                message: e.to_string(),
            }),
        }
    }

    bridge.shutdown();
    Ok(AddResult {
        ok: errors.is_empty(),
        added,
        errors,
    })
}
