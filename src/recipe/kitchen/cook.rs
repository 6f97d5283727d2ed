// src/recipe/kitchen/cook.rs

//! Cook: patch the sources and run the build tool for one plan

use super::KitchenConfig;
use super::fetch::fetch_file;
use super::plan::{BuildPlan, PatchSource, PatchStep, ReplaceStep};
use super::process::{self, CancelToken, ToolCommand, ToolOutput};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of a successful build
#[derive(Debug)]
pub struct BuildOutput {
    pub build_folder: PathBuf,
    /// Build log
    pub log: String,
}

/// A single build execution
pub struct Cook<'a> {
    plan: &'a BuildPlan,
    config: &'a KitchenConfig,
    cancel: &'a CancelToken,
    log: String,
}

impl<'a> Cook<'a> {
    pub fn new(plan: &'a BuildPlan, config: &'a KitchenConfig, cancel: &'a CancelToken) -> Self {
        Self {
            plan,
            config,
            cancel,
            log: String::new(),
        }
    }

    /// Phase 1: apply patches in order
    pub fn patch(&mut self) -> Result<()> {
        for step in &self.plan.patches {
            self.cancel.check()?;
            info!("Applying patch: {}", step.label);
            self.apply_patch(step)?;
            self.log_line(&format!("Applied patch: {}", step.label));
        }
        Ok(())
    }

    fn apply_patch(&mut self, step: &PatchStep) -> Result<()> {
        let patch_error = |message: String| Error::Patch {
            patch: step.label.clone(),
            message,
        };

        // Keeps a downloaded patch alive until it is applied.
        let mut _download = None;
        let file = match &step.source {
            PatchSource::Local { path } => {
                if !path.is_file() {
                    return Err(patch_error(format!("{} does not exist", path.display())));
                }
                path.clone()
            }
            PatchSource::Remote { url, checksum } => {
                fs::create_dir_all(&self.config.work_root)?;
                let dir = tempfile::Builder::new()
                    .prefix("pantry-patch-")
                    .tempdir_in(&self.config.work_root)?;
                let file = fetch_file(url, checksum, dir.path(), &self.config.fetch_options(), self.cancel)
                    .map_err(|e| match e {
                        Error::Cancelled => Error::Cancelled,
                        other => patch_error(other.to_string()),
                    })?;
                _download = Some(dir);
                file
            }
        };

        if !step.dir.is_dir() {
            return Err(patch_error(format!(
                "base path {} does not exist",
                step.dir.display()
            )));
        }

        let cmd = ToolCommand::new("patch", &step.dir).args([
            "--batch".to_string(),
            "--forward".to_string(),
            format!("-p{}", step.strip),
            "-i".to_string(),
            file.to_string_lossy().to_string(),
        ]);

        match process::run(&cmd, self.cancel, self.config.timeout) {
            Ok(output) => {
                self.log_tool_output(&cmd, &output);
                Ok(())
            }
            Err(Error::ExternalTool {
                status,
                stdout,
                stderr,
                ..
            }) => Err(patch_error(format!(
                "patch {}: {}{}",
                status,
                stdout.trim(),
                stderr.trim()
            ))),
            Err(e) => Err(e),
        }
    }

    /// Phase 2: in-file replacements
    pub fn replace(&mut self) -> Result<()> {
        for step in &self.plan.replacements {
            self.cancel.check()?;
            let changed = apply_replacement(step)?;
            debug!("Replaced '{}' in {} file(s) matching {}", step.from, changed, step.files);
            self.log_line(&format!(
                "Replaced '{}' in {} file(s) matching {}",
                step.from, changed, step.files
            ));
        }
        Ok(())
    }

    /// Phase 3: simmer - run the build tool
    pub fn simmer(&mut self) -> Result<()> {
        for cmd in &self.plan.build_steps {
            if !cmd.cwd.is_dir() {
                return Err(Error::ExternalTool {
                    program: cmd.display(),
                    status: format!("working directory {} does not exist", cmd.cwd.display()),
                    stdout: String::new(),
                    stderr: String::new(),
                });
            }
            info!("Running: {}", cmd.display());
            let output = process::run(cmd, self.cancel, self.config.timeout)?;
            self.log_tool_output(cmd, &output);
        }
        Ok(())
    }

    pub fn into_log(self) -> String {
        self.log
    }

    fn log_line(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }

    fn log_tool_output(&mut self, cmd: &ToolCommand, output: &ToolOutput) {
        self.log_line(&format!("=== {} ===", cmd.display()));
        self.log.push_str(&output.stdout);
        self.log.push_str(&output.stderr);
    }
}

/// Replace text in every file matching the step's glob
///
/// Returns the number of files changed. A strict step that changes
/// nothing is an error.
fn apply_replacement(step: &ReplaceStep) -> Result<usize> {
    let replace_error = |message: String| Error::Patch {
        patch: format!("replace '{}' in {}", step.from, step.files),
        message,
    };

    let paths = glob::glob(&step.files).map_err(|e| replace_error(e.to_string()))?;
    let mut changed = 0;

    for path in paths {
        let path = path.map_err(|e| replace_error(e.to_string()))?;
        if !path.is_file() {
            continue;
        }
        let Ok(content) = fs::read_to_string(&path) else {
            warn!("Skipping non-UTF-8 file {}", path.display());
            continue;
        };
        if content.contains(&step.from) {
            fs::write(&path, content.replace(&step.from, &step.to))?;
            changed += 1;
        }
    }

    if changed == 0 && step.strict {
        return Err(replace_error("no matching file contains the text".to_string()));
    }
    Ok(changed)
}

/// Patch and build the sources in the plan's build folder
pub fn build(plan: &BuildPlan, config: &KitchenConfig, cancel: &CancelToken) -> Result<BuildOutput> {
    check_build_folder(&plan.folders.build)?;

    let mut cook = Cook::new(plan, config, cancel);
    cook.patch()?;
    cook.replace()?;
    cook.simmer()?;

    info!("Built {} in {}", plan.reference, plan.folders.build.display());
    Ok(BuildOutput {
        build_folder: plan.folders.build.clone(),
        log: cook.into_log(),
    })
}

fn check_build_folder(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(Error::NotFound(format!(
            "build folder {} does not exist",
            dir.display()
        )))
    }
}
