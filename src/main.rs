// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use pantry::recipe::{CancelToken, Kitchen, PantryConfig};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let Some(command) = cli.command else {
        println!("Pantry v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'pantry --help' for usage information");
        return Ok(());
    };

    let config = PantryConfig::load(cli.config.as_deref())
        .with_context(|| "Failed to load configuration")?;
    let kitchen = Kitchen::new(config.kitchen_config());

    // Ctrl-C stops running tools and removes working directories
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Interrupted, cleaning up...");
        handler_token.cancel();
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    match command {
        Commands::Source {
            recipe,
            version,
            source_folder,
        } => commands::cmd_source(&kitchen, &recipe, &version, &source_folder, &cancel),

        Commands::Build {
            recipe,
            version,
            folders,
            profile,
        } => commands::cmd_build(&kitchen, &recipe, &version, &folders, &profile, &cancel),

        Commands::Package {
            recipe,
            version,
            folders,
            profile,
        } => commands::cmd_package(&kitchen, &recipe, &version, &folders, &profile, &cancel),

        Commands::PackageInfo { package_folder } => commands::cmd_package_info(&package_folder),

        Commands::Create {
            recipe,
            version,
            output,
            profile,
            keep_builddir,
        } => commands::cmd_create(
            &kitchen,
            &recipe,
            &version,
            &output,
            &profile,
            keep_builddir,
            &cancel,
        ),

        Commands::Batch {
            recipes_dir,
            version,
            base_version,
            package,
            prefix,
            jobs,
            output,
            profile,
        } => commands::cmd_batch(
            &kitchen,
            &recipes_dir,
            &version,
            base_version,
            package,
            &prefix,
            jobs,
            &output,
            &profile,
            &cancel,
        ),

        Commands::Inspect {
            recipe,
            version,
            profile,
        } => commands::cmd_inspect(&kitchen, &recipe, &version, &profile),

        Commands::Validate { recipe } => commands::cmd_validate(&recipe),

        Commands::Completions { shell } => commands::cmd_completions(shell),
    }
}
