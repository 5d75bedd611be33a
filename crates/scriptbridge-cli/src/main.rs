#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::fn_params_excessive_bools)]

mod commands;
mod logging;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use scriptbridge_core::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "scriptbridge")]
#[command(author, version, about = "npm packages for vault scripts", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Vault root (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR", env = "SCRIPTBRIDGE_VAULT")]
    vault: Option<PathBuf>,

    /// npm registry URL (overrides scriptbridge.json)
    #[arg(long, global = true, value_name = "URL", env = "SCRIPTBRIDGE_NPM_REGISTRY")]
    registry: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Materialize packages into the vault
    Add {
        /// Packages to add (e.g., "lodash", "dayjs@1.11.10", "@preact/signals")
        #[arg(required = true)]
        specs: Vec<String>,
    },

    /// Resolve a script's imports and print the rewritten module
    Transform {
        /// Vault-relative path of the script
        file: String,

        /// Write the result here instead of stdout
        #[arg(long, short = 'o', value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Resolve a specifier against the installed packages
    Resolve {
        /// Import specifier (e.g., "lodash/fp", "./utils")
        specifier: String,

        /// Vault-relative path of the importing file
        #[arg(long, value_name = "FILE")]
        from: Option<String>,
    },

    /// Inspect the resolution cache
    Cache {
        #[command(subcommand)]
        cache_cmd: CacheCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CacheCommands {
    /// List materialized packages
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Some(Commands::Version) | None => return commands::version::run(cli.json),
        Some(command) => command,
    };

    let vault = cli
        .vault
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let mut config = Config::load(&vault)
        .into_diagnostic()?
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);
    if let Some(registry) = cli.registry {
        config = config.with_registry(registry);
    }

    logging::init(config.verbosity, config.json_logs);

    match command {
        Commands::Add { specs } => commands::add::run(config, &specs, cli.json),
        Commands::Transform { file, out } => {
            commands::transform::run(config, &file, out.as_deref(), cli.json)
        }
        Commands::Resolve { specifier, from } => {
            commands::resolve::run(&config, &specifier, from.as_deref(), cli.json)
        }
        Commands::Cache {
            cache_cmd: CacheCommands::List,
        } => commands::cache::list(&config, cli.json),
        Commands::Version => unreachable!(), // Handled above
    }
}
