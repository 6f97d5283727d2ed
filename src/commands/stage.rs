// src/commands/stage.rs

//! Build and package commands - run one stage against existing folders

use super::{load_profile, load_recipe};
use crate::cli::{FolderArgs, ProfileArgs};
use anyhow::{Context, Result};
use pantry::recipe::CancelToken;
use pantry::recipe::Kitchen;
use pantry::recipe::kitchen::{BuildPlan, Folders, PackageInfo};
use std::path::Path;
use tracing::info;

/// Resolve the configuration and plan for a staged build
fn plan_for(
    kitchen: &Kitchen,
    recipe_path: &Path,
    version: &str,
    folders: &FolderArgs,
    profile_args: &ProfileArgs,
) -> Result<BuildPlan> {
    let (recipe, recipe_dir) = load_recipe(recipe_path)?;
    let profile = load_profile(profile_args)?;

    let config = kitchen
        .prepare(&recipe, version, &profile)
        .with_context(|| format!("No valid configuration for {}/{}", recipe.name(), version))?;
    info!("Package id {}", config.package_id);

    let source = std::path::absolute(&folders.source_folder)?;
    let folders = Folders {
        build: match &folders.build_folder {
            Some(dir) => std::path::absolute(dir)?,
            None => source.clone(),
        },
        source,
        package: std::path::absolute(&folders.package_folder)?,
        recipe_dir: std::path::absolute(recipe_dir)?,
    };

    kitchen
        .plan(&recipe, &config, folders, &profile)
        .with_context(|| format!("Failed to plan {}/{}", recipe.name(), version))
}

/// Patch and build fetched sources
pub fn cmd_build(
    kitchen: &Kitchen,
    recipe_path: &Path,
    version: &str,
    folders: &FolderArgs,
    profile_args: &ProfileArgs,
    cancel: &CancelToken,
) -> Result<()> {
    let plan = plan_for(kitchen, recipe_path, version, folders, profile_args)?;

    let output = kitchen
        .build(&plan, cancel)
        .with_context(|| format!("Failed to build {}", plan.reference))?;

    println!("[OK] Built {} in {}", plan.reference, output.build_folder.display());
    Ok(())
}

/// Install a build into its package folder
pub fn cmd_package(
    kitchen: &Kitchen,
    recipe_path: &Path,
    version: &str,
    folders: &FolderArgs,
    profile_args: &ProfileArgs,
    cancel: &CancelToken,
) -> Result<()> {
    let plan = plan_for(kitchen, recipe_path, version, folders, profile_args)?;

    let artifact = kitchen
        .package(&plan, cancel)
        .with_context(|| format!("Failed to package {}", plan.reference))?;

    println!("[OK] Packaged {} ({} files)", plan.reference, artifact.files.len());
    println!("  Package folder: {}", artifact.folder.display());
    Ok(())
}

/// Print the `package_info.json` of a package folder
pub fn cmd_package_info(package_folder: &Path) -> Result<()> {
    let info = PackageInfo::read(package_folder)
        .with_context(|| format!("Not a package folder: {}", package_folder.display()))?;

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
