mod args;
mod commands;
mod config;
mod dirs;

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use usage_app::{AppError, AppPaths, AppState};

use crate::args::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if err.is_conflict() {
                eprintln!("  - run `ccu pull`, then `ccu push` again");
                eprintln!("  - or run `ccu push --force` to overwrite the remote manifest");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), AppError> {
    let dirs = dirs::resolve_dirs().map_err(AppError::Message)?;
    let config = config::load_or_create(&dirs.config_dir).map_err(AppError::Message)?;
    if config.created {
        println!("Created config at {}.", config.paths.file.display());
    }
    debug!(
        config_dir = %dirs.config_dir.display(),
        data_dir = %dirs.data_dir.display(),
        matched_existing = dirs.matched_existing,
        "resolved directories"
    );

    let paths = AppPaths::new(dirs.config_dir, dirs.data_dir);
    let app_state = AppState::new(paths, config.config);
    app_state.initialize()?;

    commands::dispatch(&app_state, cli.command)
}
