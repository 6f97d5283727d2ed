// src/recipe/kitchen/plate.rs

//! Plate: install build artifacts into the package layout
//!
//! Everything is installed into a staging directory next to the package
//! folder. Only a staging tree that passes the layout checks is renamed
//! into place; on any failure the staging directory is removed and an
//! existing package folder is left untouched.

use super::KitchenConfig;
use super::info::PackageInfo;
use super::plan::{BuildPlan, CopyStep, rooted_glob};
use super::process::{self, CancelToken};
use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Directory every package must ship its license files in
pub const LICENSES_DIR: &str = "licenses";

/// A published package
#[derive(Debug)]
pub struct PackageArtifact {
    pub folder: PathBuf,
    pub info: PackageInfo,
    /// Installed files, relative to `folder`
    pub files: Vec<PathBuf>,
    /// Install log
    pub log: String,
}

/// Removes the staging directory unless disarmed
struct StagingGuard {
    path: PathBuf,
    armed: bool,
}

impl StagingGuard {
    fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Removing stale staging directory {}", path.display());
            fs::remove_dir_all(path)?;
        }
        fs::create_dir_all(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            armed: true,
        })
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if self.armed
            && self.path.exists()
            && let Err(e) = fs::remove_dir_all(&self.path)
        {
            warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

fn staging_error(message: impl Into<String>) -> Error {
    Error::Staging(message.into())
}

/// Install, check and publish the package for a built plan
pub fn install(
    plan: &BuildPlan,
    config: &KitchenConfig,
    cancel: &CancelToken,
) -> Result<PackageArtifact> {
    cancel.check()?;
    let guard = StagingGuard::create(&plan.staging)?;
    let staging = &plan.staging;
    let mut log = String::new();

    for cmd in &plan.install_steps {
        info!("Running: {}", cmd.display());
        let output = process::run(cmd, cancel, config.timeout)?;
        log.push_str(&format!("=== {} ===\n", cmd.display()));
        log.push_str(&output.stdout);
        log.push_str(&output.stderr);
    }

    for copy in &plan.copies {
        cancel.check()?;
        let copied = copy_matching(copy, staging)?;
        if copied == 0 {
            warn!(
                "No files matching '{}' under {}",
                copy.pattern,
                copy.src.display()
            );
        }
        log.push_str(&format!(
            "Copied {} file(s) matching '{}' to {}\n",
            copied, copy.pattern, copy.dst
        ));
    }

    for pattern in &plan.cleanup {
        remove_matching(staging, pattern)?;
    }

    check_layout(plan, staging)?;
    plan.info.write(staging)?;
    let files = list_files(staging)?;

    cancel.check()?;
    publish(staging, &plan.folders.package)?;
    guard.disarm();

    info!(
        "Packaged {} into {} ({} files)",
        plan.reference,
        plan.folders.package.display(),
        files.len()
    );
    Ok(PackageArtifact {
        folder: plan.folders.package.clone(),
        info: plan.info.clone(),
        files,
        log,
    })
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    }
}

fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Copy files under `copy.src` whose relative path matches the pattern
fn copy_matching(copy: &CopyStep, staging: &Path) -> Result<usize> {
    let pattern = Pattern::new(&copy.pattern)
        .map_err(|e| staging_error(format!("invalid copy pattern '{}': {}", copy.pattern, e)))?;
    if !copy.src.is_dir() {
        return Ok(0);
    }

    let dst = staging.join(&copy.dst);
    let mut copied = 0;

    for entry in WalkDir::new(&copy.src).min_depth(1) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&copy.src)
            .map_err(|e| staging_error(e.to_string()))?;
        if !pattern.matches_with(&relative_string(relative), match_options()) {
            continue;
        }

        let target = if copy.keep_path {
            dst.join(relative)
        } else {
            dst.join(entry.file_name())
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &target)?;
        copied += 1;
    }
    Ok(copied)
}

/// Remove files and directories matching a glob relative to `root`
fn remove_matching(root: &Path, pattern: &str) -> Result<usize> {
    let paths = glob::glob(&rooted_glob(root, pattern))
        .map_err(|e| staging_error(format!("invalid remove pattern '{}': {}", pattern, e)))?;

    let mut removed = 0;
    for path in paths {
        let path = path.map_err(|e| staging_error(e.to_string()))?;
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        debug!("Removed {}", path.display());
        removed += 1;
    }
    Ok(removed)
}

fn check_layout(plan: &BuildPlan, staging: &Path) -> Result<()> {
    let licenses = staging.join(LICENSES_DIR);
    let has_license = licenses.is_dir() && fs::read_dir(&licenses)?.next().is_some();
    if !has_license {
        return Err(staging_error(format!(
            "{} installed no license files into {}/",
            plan.reference, LICENSES_DIR
        )));
    }

    for pattern in &plan.expect {
        let found = glob::glob(&rooted_glob(staging, pattern))
            .map_err(|e| staging_error(format!("invalid expect pattern '{}': {}", pattern, e)))?
            .any(|p| p.is_ok());
        if !found {
            return Err(staging_error(format!(
                "{} is missing expected artifact {}",
                plan.reference, pattern
            )));
        }
    }
    Ok(())
}

fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| staging_error(e.to_string()))?;
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}

/// Replace the package folder with the staging tree
///
/// An existing package is moved aside first and only removed once the
/// new tree is in place, so the folder is never left half-replaced.
fn publish(staging: &Path, package: &Path) -> Result<()> {
    if let Some(parent) = package.parent() {
        fs::create_dir_all(parent)?;
    }
    if !package.exists() {
        fs::rename(staging, package)?;
        return Ok(());
    }

    let previous = aside_path(package);
    debug!(
        "Replacing existing package {} (previous kept at {})",
        package.display(),
        previous.display()
    );
    if previous.exists() {
        fs::remove_dir_all(&previous)?;
    }
    fs::rename(package, &previous)?;

    if let Err(e) = fs::rename(staging, package) {
        if let Err(restore) = fs::rename(&previous, package) {
            warn!(
                "Failed to restore {} from {}: {}",
                package.display(),
                previous.display(),
                restore
            );
        }
        return Err(e.into());
    }

    if let Err(e) = fs::remove_dir_all(&previous) {
        warn!("Failed to remove {}: {}", previous.display(), e);
    }
    Ok(())
}

/// `<package>.old-<pid>`, a sibling of the package folder
fn aside_path(package: &Path) -> PathBuf {
    let mut name = package
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "package".into());
    name.push(format!(".old-{}", std::process::id()));
    package.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::kitchen::plan::Folders;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn plan(build: &Path, package: &Path) -> BuildPlan {
        let folders = Folders::in_source(build, package, build);
        BuildPlan {
            name: "amgcl".to_string(),
            version: "1.4.0".to_string(),
            reference: "amgcl/1.4.0".to_string(),
            staging: folders.staging(),
            folders,
            patches: Vec::new(),
            replacements: Vec::new(),
            build_steps: Vec::new(),
            install_steps: Vec::new(),
            env: BTreeMap::new(),
            copies: vec![
                CopyStep {
                    pattern: "LICENSE.md".to_string(),
                    src: build.to_path_buf(),
                    dst: "licenses".to_string(),
                    keep_path: false,
                },
                CopyStep {
                    pattern: "*.hpp".to_string(),
                    src: build.join("amgcl"),
                    dst: "include/amgcl".to_string(),
                    keep_path: true,
                },
            ],
            cleanup: vec!["lib/*.la".to_string(), "lib/pkgconfig".to_string()],
            expect: vec!["include/amgcl/amg.hpp".to_string()],
            info: PackageInfo {
                name: "amgcl".to_string(),
                version: "1.4.0".to_string(),
                package_id: "0".repeat(64),
                header_only: true,
                settings: BTreeMap::new(),
                options: BTreeMap::new(),
                requires: Vec::new(),
                libs: Vec::new(),
                system_libs: Vec::new(),
                defines: Vec::new(),
                include_dirs: vec!["include".to_string()],
                lib_dirs: Vec::new(),
                bin_dirs: Vec::new(),
                path_additions: Vec::new(),
                names: BTreeMap::new(),
            },
        }
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sources(dir: &Path) {
        write(&dir.join("LICENSE.md"), "MIT");
        write(&dir.join("amgcl/amg.hpp"), "#pragma once");
        write(&dir.join("amgcl/solver/cg.hpp"), "#pragma once");
        write(&dir.join("amgcl/README"), "docs");
    }

    #[test]
    fn test_install_layout() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("src");
        let package = tmp.path().join("out/amgcl");
        sources(&build);

        let plan = plan(&build, &package);
        let artifact = install(&plan, &KitchenConfig::isolated(tmp.path()), &CancelToken::new())
            .unwrap();

        assert!(package.join("licenses/LICENSE.md").is_file());
        assert!(package.join("include/amgcl/amg.hpp").is_file());
        assert!(package.join("include/amgcl/solver/cg.hpp").is_file());
        assert!(!package.join("include/amgcl/README").exists());
        assert!(package.join(PackageInfo::FILE_NAME).is_file());
        assert!(!plan.staging.exists());
        assert!(artifact.files.contains(&PathBuf::from("licenses/LICENSE.md")));
    }

    #[test]
    fn test_cleanup_removes_libtool_and_pkgconfig() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("src");
        let package = tmp.path().join("out/marisa");
        sources(&build);
        write(&build.join("lib/libmarisa.a"), "archive");
        write(&build.join("lib/libmarisa.la"), "libtool");
        write(&build.join("lib/pkgconfig/marisa.pc"), "pc");

        let mut plan = plan(&build, &package);
        plan.copies.push(CopyStep {
            pattern: "lib/*".to_string(),
            src: build.clone(),
            dst: ".".to_string(),
            keep_path: true,
        });
        install(&plan, &KitchenConfig::isolated(tmp.path()), &CancelToken::new()).unwrap();

        assert!(package.join("lib/libmarisa.a").is_file());
        assert!(!package.join("lib/libmarisa.la").exists());
        assert!(!package.join("lib/pkgconfig").exists());
    }

    #[test]
    fn test_missing_license_fails_and_keeps_old_package() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("src");
        let package = tmp.path().join("out/amgcl");
        write(&build.join("amgcl/amg.hpp"), "#pragma once");
        write(&package.join("old.txt"), "previous build");

        let plan = plan(&build, &package);
        let err = install(&plan, &KitchenConfig::isolated(tmp.path()), &CancelToken::new())
            .unwrap_err();

        assert!(matches!(err, Error::Staging(_)));
        assert!(!plan.staging.exists());
        assert!(package.join("old.txt").is_file());
    }

    #[test]
    fn test_missing_expected_artifact() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("src");
        sources(&build);

        let mut plan = plan(&build, &tmp.path().join("out/amgcl"));
        plan.expect.push("lib/libamgcl.a".to_string());
        let err = install(&plan, &KitchenConfig::isolated(tmp.path()), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::Staging(ref m) if m.contains("lib/libamgcl.a")));
    }

    #[test]
    fn test_republish_replaces_old_package() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("src");
        let package = tmp.path().join("out/amgcl");
        sources(&build);
        write(&package.join("stale.txt"), "old");

        let plan = plan(&build, &package);
        install(&plan, &KitchenConfig::isolated(tmp.path()), &CancelToken::new()).unwrap();
        assert!(!package.join("stale.txt").exists());
        assert!(package.join("include/amgcl/amg.hpp").is_file());
        assert!(!aside_path(&package).exists());
    }

    #[test]
    fn test_failed_publish_restores_old_package() {
        let tmp = TempDir::new().unwrap();
        let package = tmp.path().join("out/amgcl");
        write(&package.join("old.txt"), "previous build");

        // No staging tree, so moving it into place fails
        let err = publish(&tmp.path().join("out/.amgcl.staging"), &package).unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert!(package.join("old.txt").is_file());
        assert!(!aside_path(&package).exists());
    }

    #[test]
    fn test_publish_clears_leftover_aside_folder() {
        let tmp = TempDir::new().unwrap();
        let package = tmp.path().join("out/amgcl");
        let staging = tmp.path().join("out/.amgcl.staging");
        write(&package.join("old.txt"), "previous build");
        write(&aside_path(&package).join("crashed.txt"), "interrupted run");
        write(&staging.join("new.txt"), "fresh build");

        publish(&staging, &package).unwrap();

        assert!(package.join("new.txt").is_file());
        assert!(!package.join("old.txt").exists());
        assert!(!aside_path(&package).exists());
        assert!(!staging.exists());
    }

    #[test]
    fn test_install_into_folder_with_glob_characters() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("src");
        let package = tmp.path().join("out[1]/marisa");
        sources(&build);
        write(&build.join("lib/libmarisa.a"), "archive");
        write(&build.join("lib/libmarisa.la"), "libtool");
        write(&build.join("lib/pkgconfig/marisa.pc"), "pc");

        let mut plan = plan(&build, &package);
        plan.copies.push(CopyStep {
            pattern: "lib/*".to_string(),
            src: build.clone(),
            dst: ".".to_string(),
            keep_path: true,
        });
        plan.expect.push("lib/libmarisa.a".to_string());
        install(&plan, &KitchenConfig::isolated(tmp.path()), &CancelToken::new()).unwrap();

        assert!(package.join("lib/libmarisa.a").is_file());
        assert!(!package.join("lib/libmarisa.la").exists());
        assert!(!package.join("lib/pkgconfig").exists());
    }
}
