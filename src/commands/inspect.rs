// src/commands/inspect.rs

//! Inspect and validate commands - look at a recipe without building it

use super::{load_profile, load_recipe};
use crate::cli::ProfileArgs;
use anyhow::{Context, Result};
use pantry::recipe::Kitchen;
use pantry::recipe::kitchen::Folders;
use pantry::recipe::validate_recipe;
use std::path::Path;

/// Print the resolved configuration and build plan as JSON
///
/// Folders in the plan are placeholders below the kitchen's work root;
/// nothing is fetched or written.
pub fn cmd_inspect(
    kitchen: &Kitchen,
    recipe_path: &Path,
    version: &str,
    profile_args: &ProfileArgs,
) -> Result<()> {
    let (recipe, recipe_dir) = load_recipe(recipe_path)?;
    let profile = load_profile(profile_args)?;

    let config = kitchen
        .prepare(&recipe, version, &profile)
        .with_context(|| format!("No valid configuration for {}/{}", recipe.name(), version))?;

    let source = kitchen
        .config()
        .work_root
        .join(format!("{}-{}", recipe.name(), version));
    let package = Kitchen::package_folder(&std::path::absolute("packages")?, &config);
    let folders = Folders::in_source(&source, &package, &std::path::absolute(recipe_dir)?);
    let plan = kitchen
        .plan(&recipe, &config, folders, &profile)
        .with_context(|| format!("Failed to plan {}/{}", recipe.name(), version))?;

    let report = serde_json::json!({
        "configuration": config,
        "plan": plan,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Validate a recipe file
pub fn cmd_validate(recipe_path: &Path) -> Result<()> {
    let (recipe, _) = load_recipe(recipe_path)?;
    println!("Recipe: {} ({} version(s))", recipe.name(), recipe.sources.len());

    let warnings = validate_recipe(&recipe).with_context(|| "Recipe validation failed")?;
    for warning in &warnings {
        println!("Warning: {}", warning);
    }

    if warnings.is_empty() {
        println!("[OK] No issues found");
    } else {
        println!("[OK] {} warning(s)", warnings.len());
    }
    Ok(())
}
