// src/commands/batch.rs

//! Batch command - cook a tree of recipes over the common build matrix

use super::load_profile;
use crate::cli::ProfileArgs;
use anyhow::{Context, Result, bail};
use pantry::batch::{self, BatchRequest};
use pantry::recipe::{CancelToken, Kitchen};
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub fn cmd_batch(
    kitchen: &Kitchen,
    recipes_dir: &Path,
    version: &str,
    base_version: Option<String>,
    package: Option<String>,
    prefix: &str,
    jobs: usize,
    output_dir: &Path,
    profile_args: &ProfileArgs,
    cancel: &CancelToken,
) -> Result<()> {
    let mut request = BatchRequest::new(version, output_dir);
    request.base_version = base_version;
    request.package = package;
    request.prefix = prefix.to_string();
    request.jobs = jobs;
    request.profile = load_profile(profile_args)?;

    std::fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    let report = batch::run(recipes_dir, &request, kitchen, cancel)
        .with_context(|| format!("Batch build in {} failed", recipes_dir.display()))?;

    for success in &report.succeeded {
        println!(
            "[OK] {} [{}] -> {}",
            success.reference,
            success.variant,
            success.package_folder.display()
        );
    }
    for failure in &report.failed {
        println!("[FAILED] {} [{}]: {}", failure.reference, failure.variant, failure.error);
    }

    println!(
        "\n{} succeeded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );

    if !report.is_success() {
        bail!("{} build(s) failed", report.failed.len());
    }
    Ok(())
}
