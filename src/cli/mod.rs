// src/cli/mod.rs
//! CLI definitions for Pantry
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! Single-package stages, usable one at a time:
//! - `source` - Fetch, verify and unpack sources
//! - `build` - Patch and build unpacked sources
//! - `package` - Install a build into a package folder
//! - `package-info` - Show the consumer metadata of a package
//!
//! Whole pipeline:
//! - `create` - Cook a recipe into a package in one go
//! - `batch` - Cook a tree of recipes over a build matrix
//!
//! Recipe tools:
//! - `inspect` - Show the resolved configuration and build plan
//! - `validate` - Check a recipe

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pantry")]
#[command(author = "Pantry Contributors")]
#[command(version)]
#[command(about = "Recipe-driven builds of native libraries", long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ~/.config/pantry/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Settings, options and environment for one build
#[derive(Args, Debug, Clone, Default)]
pub struct ProfileArgs {
    /// Profile file with [settings], [options] and [env] tables
    #[arg(long, value_name = "FILE")]
    pub profile: Option<PathBuf>,

    /// Override a setting (e.g. -s compiler.version=11)
    #[arg(short = 's', long = "setting", value_name = "KEY=VALUE")]
    pub settings: Vec<String>,

    /// Override an option (e.g. -o shared=True)
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,
}

/// Folders of a staged build
#[derive(Args, Debug, Clone)]
pub struct FolderArgs {
    /// Unpacked sources (from `pantry source`)
    #[arg(long, value_name = "DIR")]
    pub source_folder: PathBuf,

    /// Where the build runs (default: the source folder)
    #[arg(long, value_name = "DIR")]
    pub build_folder: Option<PathBuf>,

    /// Final package location
    #[arg(long, value_name = "DIR")]
    pub package_folder: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    // =========================================================================
    // Stages
    // =========================================================================
    /// Fetch, verify and unpack the sources of a recipe version
    Source {
        /// Recipe file or directory containing recipe.toml
        recipe: PathBuf,

        /// Upstream version to fetch
        #[arg(long)]
        version: String,

        /// Destination for the unpacked sources
        #[arg(long, value_name = "DIR")]
        source_folder: PathBuf,
    },

    /// Patch and build previously fetched sources
    Build {
        /// Recipe file or directory containing recipe.toml
        recipe: PathBuf,

        /// Upstream version to build
        #[arg(long)]
        version: String,

        #[command(flatten)]
        folders: FolderArgs,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Install a finished build into its package folder
    Package {
        /// Recipe file or directory containing recipe.toml
        recipe: PathBuf,

        /// Upstream version being packaged
        #[arg(long)]
        version: String,

        #[command(flatten)]
        folders: FolderArgs,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Print the consumer metadata of a package folder
    PackageInfo {
        /// Package folder containing package_info.json
        #[arg(long, value_name = "DIR")]
        package_folder: PathBuf,
    },

    // =========================================================================
    // Pipeline
    // =========================================================================
    /// Select, fetch, build and package a recipe version
    Create {
        /// Recipe file or directory containing recipe.toml
        recipe: PathBuf,

        /// Upstream version to build
        #[arg(long)]
        version: String,

        /// Output directory for package folders
        #[arg(long, default_value = "./packages", value_name = "DIR")]
        output: PathBuf,

        #[command(flatten)]
        profile: ProfileArgs,

        /// Keep the build directory after completion
        #[arg(long)]
        keep_builddir: bool,
    },

    /// Cook every recipe below a directory over the common build matrix
    Batch {
        /// Directory with one `<prefix><package>` folder per recipe
        recipes_dir: PathBuf,

        /// Version to build
        #[arg(long)]
        version: String,

        /// Version to build for the `base` package
        #[arg(long)]
        base_version: Option<String>,

        /// Only build this package
        #[arg(long)]
        package: Option<String>,

        /// Prefix stripped from recipe directory names (e.g. boost_)
        #[arg(long, default_value = "")]
        prefix: String,

        /// Number of packages built concurrently
        #[arg(short, long, default_value = "1")]
        jobs: usize,

        /// Output directory for package folders
        #[arg(long, default_value = "./packages", value_name = "DIR")]
        output: PathBuf,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    // =========================================================================
    // Recipe tools
    // =========================================================================
    /// Print the resolved configuration and build plan as JSON
    Inspect {
        /// Recipe file or directory containing recipe.toml
        recipe: PathBuf,

        /// Upstream version to resolve
        #[arg(long)]
        version: String,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Validate a recipe without building it
    Validate {
        /// Recipe file or directory containing recipe.toml
        recipe: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_build_overrides() {
        let cli = Cli::try_parse_from([
            "pantry",
            "build",
            "recipes/marisa",
            "--version",
            "0.2.6",
            "--source-folder",
            "src",
            "--package-folder",
            "pkg",
            "-s",
            "compiler.version=11",
            "-o",
            "shared=True",
            "-o",
            "fPIC=False",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Build {
                version,
                folders,
                profile,
                ..
            }) => {
                assert_eq!(version, "0.2.6");
                assert_eq!(folders.build_folder, None);
                assert_eq!(profile.settings, vec!["compiler.version=11"]);
                assert_eq!(profile.options, vec!["shared=True", "fPIC=False"]);
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pantry", "validate", "recipe.toml", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Commands::Validate { .. })));
    }

    #[test]
    fn test_cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
