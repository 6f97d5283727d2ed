// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: recipe file or directory
fn recipe_arg() -> Arg {
    Arg::new("recipe")
        .required(true)
        .help("Recipe file or directory containing recipe.toml")
}

/// Common argument: upstream version
fn version_arg() -> Arg {
    Arg::new("version")
        .long("version")
        .required(true)
        .help("Upstream version")
}

/// Common arguments: profile and overrides
fn profile_args() -> [Arg; 3] {
    [
        Arg::new("profile")
            .long("profile")
            .value_name("FILE")
            .help("Profile file with [settings], [options] and [env] tables"),
        Arg::new("setting")
            .short('s')
            .long("setting")
            .value_name("KEY=VALUE")
            .action(ArgAction::Append)
            .help("Override a setting"),
        Arg::new("option")
            .short('o')
            .long("option")
            .value_name("KEY=VALUE")
            .action(ArgAction::Append)
            .help("Override an option"),
    ]
}

/// Common arguments: staged build folders
fn folder_args() -> [Arg; 3] {
    [
        Arg::new("source_folder")
            .long("source-folder")
            .required(true)
            .value_name("DIR")
            .help("Unpacked sources"),
        Arg::new("build_folder")
            .long("build-folder")
            .value_name("DIR")
            .help("Where the build runs (default: the source folder)"),
        Arg::new("package_folder")
            .long("package-folder")
            .required(true)
            .value_name("DIR")
            .help("Final package location"),
    ]
}

fn output_arg() -> Arg {
    Arg::new("output")
        .long("output")
        .value_name("DIR")
        .default_value("./packages")
        .help("Output directory for package folders")
}

fn build_cli() -> Command {
    Command::new("pantry")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Pantry Contributors")
        .about("Recipe-driven builds of native libraries")
        .subcommand_required(false)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable debug logging"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Configuration file (default: ~/.config/pantry/config.toml)"),
        )
        .subcommand(
            Command::new("source")
                .about("Fetch, verify and unpack the sources of a recipe version")
                .arg(recipe_arg())
                .arg(version_arg())
                .arg(
                    Arg::new("source_folder")
                        .long("source-folder")
                        .required(true)
                        .value_name("DIR")
                        .help("Destination for the unpacked sources"),
                ),
        )
        .subcommand(
            Command::new("build")
                .about("Patch and build previously fetched sources")
                .arg(recipe_arg())
                .arg(version_arg())
                .args(folder_args())
                .args(profile_args()),
        )
        .subcommand(
            Command::new("package")
                .about("Install a finished build into its package folder")
                .arg(recipe_arg())
                .arg(version_arg())
                .args(folder_args())
                .args(profile_args()),
        )
        .subcommand(
            Command::new("package-info")
                .about("Print the consumer metadata of a package folder")
                .arg(
                    Arg::new("package_folder")
                        .long("package-folder")
                        .required(true)
                        .value_name("DIR")
                        .help("Package folder containing package_info.json"),
                ),
        )
        .subcommand(
            Command::new("create")
                .about("Select, fetch, build and package a recipe version")
                .arg(recipe_arg())
                .arg(version_arg())
                .arg(output_arg())
                .args(profile_args())
                .arg(
                    Arg::new("keep_builddir")
                        .long("keep-builddir")
                        .action(ArgAction::SetTrue)
                        .help("Keep the build directory after completion"),
                ),
        )
        .subcommand(
            Command::new("batch")
                .about("Cook every recipe below a directory over the common build matrix")
                .arg(Arg::new("recipes_dir").required(true).help("Directory of recipe folders"))
                .arg(version_arg())
                .arg(Arg::new("base_version").long("base-version").help("Version for the base package"))
                .arg(Arg::new("package").long("package").help("Only build this package"))
                .arg(
                    Arg::new("prefix")
                        .long("prefix")
                        .default_value("")
                        .help("Prefix stripped from recipe directory names"),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .default_value("1")
                        .help("Number of packages built concurrently"),
                )
                .arg(output_arg())
                .args(profile_args()),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print the resolved configuration and build plan as JSON")
                .arg(recipe_arg())
                .arg(version_arg())
                .args(profile_args()),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a recipe without building it")
                .arg(recipe_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("pantry.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
