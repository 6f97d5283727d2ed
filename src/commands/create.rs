// src/commands/create.rs

//! Create command - cook a recipe version into a package

use super::{load_profile, load_recipe};
use crate::cli::ProfileArgs;
use anyhow::{Context, Result};
use pantry::recipe::{CancelToken, Kitchen, validate_recipe};
use std::path::Path;

/// Cook a package from a recipe
///
/// # Arguments
/// * `recipe_path` - Recipe file or directory containing `recipe.toml`
/// * `version` - Upstream version to build
/// * `output_dir` - Output directory for package folders
/// * `keep_builddir` - Keep build directory after completion
pub fn cmd_create(
    kitchen: &Kitchen,
    recipe_path: &Path,
    version: &str,
    output_dir: &Path,
    profile_args: &ProfileArgs,
    keep_builddir: bool,
    cancel: &CancelToken,
) -> Result<()> {
    let (recipe, recipe_dir) = load_recipe(recipe_path)?;
    println!("Recipe: {} version {}", recipe.name(), version);

    let warnings = validate_recipe(&recipe).with_context(|| "Recipe validation failed")?;
    for warning in &warnings {
        println!("Warning: {}", warning);
    }

    let profile = load_profile(profile_args)?;

    let mut config = kitchen.config().clone();
    config.keep_builddir |= keep_builddir;
    let kitchen = Kitchen::new(config);

    std::fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    println!("Cooking with {} parallel jobs...", kitchen.config().jobs);
    let result = kitchen
        .cook(&recipe, &recipe_dir, version, &profile, output_dir, cancel)
        .with_context(|| format!("Failed to cook {}/{}", recipe.name(), version))?;

    println!("\n[COMPLETE] Package created: {}", result.package_folder.display());
    println!("  Package id: {}", result.package_id);
    if !result.info.libs.is_empty() {
        println!("  Libraries: {}", result.info.libs.join(", "));
    }
    if let Some(dir) = &result.kept_builddir {
        println!("  Build directory kept at: {}", dir.display());
    }

    Ok(())
}
