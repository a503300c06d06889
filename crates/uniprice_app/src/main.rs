mod cli;
mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};
use uniprice_core::{ClassifiedCategory, Project, classify_error, logging};

use crate::cli::{Cli, Commands};
use crate::commands::App;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let classified = classify_error(&err);
            error!(category = ?classified.category, severity = ?classified.severity, "{err:#}");
            eprintln!("Error: {err:#}");
            if classified.category != ClassifiedCategory::Internal {
                eprintln!("Hint: {}", classified.hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let project = Project::open(cli.config.as_deref())?;

    // `init` must not leave a build directory behind.
    let logs_dir = match cli.command {
        Commands::Init => None,
        _ => Some(project.paths.logs_dir()),
    };
    let _guard = logging::init_logging(logging::default_filter(cli.verbose), logs_dir.as_deref())?;

    if project.config_found {
        info!(config = %project.config_path.display(), "loaded config");
    } else {
        info!(config = %project.config_path.display(), "no config file, using defaults");
    }
    if let Some(env_file) = &project.env_file {
        debug!(path = %env_file.display(), "loaded environment");
    }
    debug!(network = %cli.network, "starting");

    App::new(project, cli.network).run(cli.command).await
}
