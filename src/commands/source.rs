// src/commands/source.rs

//! Source command - fetch, verify and unpack a recipe version

use super::load_recipe;
use anyhow::{Context, Result};
use pantry::recipe::{CancelToken, Kitchen};
use std::path::Path;
use tracing::info;

/// Fetch the sources of `version` into `source_folder`
pub fn cmd_source(
    kitchen: &Kitchen,
    recipe_path: &Path,
    version: &str,
    source_folder: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    let (recipe, _) = load_recipe(recipe_path)?;
    info!("Fetching {}/{} into {}", recipe.name(), version, source_folder.display());

    let folder = kitchen
        .source(&recipe, version, source_folder, cancel)
        .with_context(|| format!("Failed to fetch sources for {}/{}", recipe.name(), version))?;

    println!("[OK] Sources for {}/{} in {}", recipe.name(), version, folder.display());
    Ok(())
}
