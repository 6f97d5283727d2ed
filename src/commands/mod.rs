// src/commands/mod.rs
//! Command handlers for the Pantry CLI

mod batch;
mod completions;
mod create;
mod inspect;
mod source;
mod stage;

// Re-export all command handlers
pub use batch::cmd_batch;
pub use completions::cmd_completions;
pub use create::cmd_create;
pub use inspect::{cmd_inspect, cmd_validate};
pub use source::cmd_source;
pub use stage::{cmd_build, cmd_package, cmd_package_info};

use crate::cli::ProfileArgs;
use anyhow::{Context, Result, bail};
use pantry::batch::RECIPE_FILE;
use pantry::recipe::{Profile, Recipe, parse_recipe_file};
use std::path::{Path, PathBuf};

/// Load a recipe from a file, or from `recipe.toml` inside a directory
///
/// Returns the recipe and the directory local patches are resolved from.
pub(crate) fn load_recipe(path: &Path) -> Result<(Recipe, PathBuf)> {
    let file = if path.is_dir() {
        path.join(RECIPE_FILE)
    } else {
        path.to_path_buf()
    };

    let recipe = parse_recipe_file(&file)
        .with_context(|| format!("Failed to parse recipe: {}", file.display()))?;
    let dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    Ok((recipe, dir))
}

/// Build a profile from `--profile` and the `-s`/`-o` overrides
pub(crate) fn load_profile(args: &ProfileArgs) -> Result<Profile> {
    let mut profile = match &args.profile {
        Some(path) => Profile::load(path)
            .with_context(|| format!("Failed to load profile: {}", path.display()))?,
        None => Profile::default(),
    };

    for setting in &args.settings {
        let (key, value) = split_assignment(setting)?;
        profile.set_setting(key, value);
    }
    for option in &args.options {
        let (key, value) = split_assignment(option)?;
        profile.set_option(key, value);
    }
    Ok(profile)
}

fn split_assignment(arg: &str) -> Result<(&str, &str)> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value.trim())),
        _ => bail!("Expected KEY=VALUE, got '{}'", arg),
    }
}
