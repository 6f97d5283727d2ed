// src/recipe/kitchen/mod.rs

//! Kitchen: where recipes are cooked into packages
//!
//! The Kitchen runs the pipeline for one recipe version:
//! - Select: resolve settings and options into a configuration (pure)
//! - Source: fetch, verify and unpack sources into a working directory
//! - Build: apply patches and run exactly one build tool
//! - Package: install into a staging tree and publish the package folder
//!
//! Every stage honors a shared [`CancelToken`]. Working directories and
//! staging trees are removed on failure and on cancellation.

mod archive;
mod config;
mod cook;
mod fetch;
mod info;
mod plan;
mod plate;
mod process;

pub use archive::{ArchiveFormat, Compression, extract_archive, strip_root};
pub use config::{CookResult, KitchenConfig, KitchenOverrides, PantryConfig, Profile};
pub use cook::{BuildOutput, Cook};
pub use fetch::{FetchOptions, SourceRef, WorkingDir, acquire, fetch_file, url_to_filename};
pub use info::PackageInfo;
pub use plan::{BuildPlan, CopyStep, Folders, PatchSource, PatchStep, ReplaceStep};
pub use plate::{LICENSES_DIR, PackageArtifact};
pub use process::{CancelToken, KILL_GRACE, ToolCommand, ToolOutput};

use crate::error::{Error, Result, Stage};
use crate::recipe::format::Recipe;
use crate::select::{ResolvedConfiguration, select};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Length of the package id prefix used in package folder names
const PACKAGE_DIR_ID_LEN: usize = 16;

/// The Kitchen: where recipes are cooked
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
}

impl Kitchen {
    /// Create a new Kitchen with the given configuration
    pub fn new(config: KitchenConfig) -> Self {
        Self { config }
    }

    /// Create a Kitchen with default configuration
    pub fn with_defaults() -> Self {
        Self::new(KitchenConfig::default())
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    /// Package folder for a configuration below `output_dir`
    ///
    /// `<output>/<name>/<version>/<package id prefix>`
    pub fn package_folder(output_dir: &Path, config: &ResolvedConfiguration) -> PathBuf {
        let id = &config.package_id[..PACKAGE_DIR_ID_LEN.min(config.package_id.len())];
        output_dir.join(&config.name).join(&config.version).join(id)
    }

    /// Resolve the configuration for a recipe version and profile
    pub fn prepare(
        &self,
        recipe: &Recipe,
        version: &str,
        profile: &Profile,
    ) -> Result<ResolvedConfiguration> {
        select(
            recipe,
            version,
            &profile.resolved_settings(),
            &profile.raw_options(),
            self.config.toolset_policy,
        )
        .map_err(|e| e.in_stage(recipe.name(), Stage::Select))
    }

    /// Fetch and unpack the sources for a version into `dest`
    pub fn source(
        &self,
        recipe: &Recipe,
        version: &str,
        dest: &Path,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        let stage = |e: Error| e.in_stage(recipe.name(), Stage::Source);

        let source = recipe.source_for(version).map_err(stage)?;
        info!("Fetching sources for {}/{}", recipe.name(), version);
        let workdir = acquire(&source, &self.config.fetch_options(), cancel).map_err(stage)?;
        workdir.persist(dest).map_err(stage)
    }

    /// Write down the build for a configuration
    pub fn plan(
        &self,
        recipe: &Recipe,
        config: &ResolvedConfiguration,
        folders: Folders,
        profile: &Profile,
    ) -> Result<BuildPlan> {
        BuildPlan::new(config, recipe, folders, &self.config, &profile.env)
            .map_err(|e| e.in_stage(recipe.name(), Stage::Build))
    }

    /// Patch and build a planned configuration
    ///
    /// Sources are copied into the build folder first when the two differ.
    pub fn build(&self, plan: &BuildPlan, cancel: &CancelToken) -> Result<BuildOutput> {
        let stage = |e: Error| e.in_stage(&plan.name, Stage::Build);

        let folders = &plan.folders;
        if folders.build != folders.source {
            debug!(
                "Copying sources from {} to {}",
                folders.source.display(),
                folders.build.display()
            );
            archive::copy_tree(&folders.source, &folders.build).map_err(stage)?;
        }
        cook::build(plan, &self.config, cancel).map_err(stage)
    }

    /// Install a built configuration and publish its package folder
    pub fn package(&self, plan: &BuildPlan, cancel: &CancelToken) -> Result<PackageArtifact> {
        plate::install(plan, &self.config, cancel)
            .map_err(|e| e.in_stage(&plan.name, Stage::Package))
    }

    /// Cook a recipe version into a package
    ///
    /// ## Full Cooking Process
    /// 1. **Select**: resolve the configuration; fails before any download
    /// 2. **Source**: fetch, verify and unpack into a temporary directory
    /// 3. **Simmer**: patch and run the build tool
    /// 4. **Plate**: install, check the layout and publish
    pub fn cook(
        &self,
        recipe: &Recipe,
        recipe_dir: &Path,
        version: &str,
        profile: &Profile,
        output_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<CookResult> {
        let config = self.prepare(recipe, version, profile)?;
        self.cook_resolved(recipe, recipe_dir, &config, profile, output_dir, cancel)
    }

    /// Cook an already resolved configuration
    pub fn cook_resolved(
        &self,
        recipe: &Recipe,
        recipe_dir: &Path,
        config: &ResolvedConfiguration,
        profile: &Profile,
        output_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<CookResult> {
        let name = recipe.name();
        info!("Cooking {}", config.reference());

        // Configure scripts need an absolute prefix.
        let output_dir = std::path::absolute(output_dir)
            .map_err(|e| Error::from(e).in_stage(name, Stage::Package))?;
        let recipe_dir = std::path::absolute(recipe_dir)
            .map_err(|e| Error::from(e).in_stage(name, Stage::Build))?;

        // Prep: fetch ingredients
        let source = recipe
            .source_for(&config.version)
            .map_err(|e| e.in_stage(name, Stage::Source))?;
        let workdir = acquire(&source, &self.config.fetch_options(), cancel)
            .map_err(|e| e.in_stage(name, Stage::Source))?;

        let package_folder = Self::package_folder(&output_dir, config);
        let folders = Folders::in_source(workdir.path(), &package_folder, &recipe_dir);
        let plan = self.plan(recipe, config, folders, profile)?;

        // Simmer and plate; the working directory goes away with `workdir`
        let built = self.build(&plan, cancel)?;
        let artifact = self.package(&plan, cancel)?;

        let kept_builddir = if self.config.keep_builddir {
            let kept = workdir.keep();
            info!("Keeping build directory {}", kept.display());
            Some(kept)
        } else {
            None
        };

        let mut log = built.log;
        log.push_str(&artifact.log);

        Ok(CookResult {
            package_folder: artifact.folder,
            package_id: config.package_id.clone(),
            info: artifact.info,
            log,
            kept_builddir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parse_recipe;

    const HELLO: &str = r#"
[package]
name = "hello"

[sources."1.0"]
url = "/nonexistent/hello-1.0.tar.gz"
checksum = "sha256:0000000000000000000000000000000000000000000000000000000000000000"

[build]
system = "msbuild"

[build.msbuild]
solution = "hello.sln"
"#;

    fn linux_profile() -> Profile {
        let mut profile = Profile::default();
        profile.set_setting("os", "Linux");
        profile.set_setting("arch", "x86_64");
        profile.set_setting("compiler", "gcc");
        profile.set_setting("compiler.version", "11");
        profile.set_setting("build_type", "Release");
        profile
    }

    #[test]
    fn test_select_fails_before_fetch() {
        let tmp = tempfile::TempDir::new().unwrap();
        let kitchen = Kitchen::new(KitchenConfig::isolated(tmp.path()));
        let recipe = parse_recipe(HELLO).unwrap();

        // MSBuild on Linux is rejected without touching the (missing) source
        let err = kitchen
            .cook(
                &recipe,
                tmp.path(),
                "1.0",
                &linux_profile(),
                &tmp.path().join("out"),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Select));
        assert!(matches!(err.root(), Error::UnsupportedPlatform(_)));
        assert!(!tmp.path().join("work").exists());
    }

    #[test]
    fn test_package_folder_layout() {
        let recipe = parse_recipe(
            r#"
[package]
name = "hello"

[sources."1.0"]
url = "/nonexistent/hello-1.0.tar.gz"
checksum = "sha256:0000000000000000000000000000000000000000000000000000000000000000"

[build]
system = "make"

[build.make]
target = "hello"
"#,
        )
        .unwrap();
        let kitchen = Kitchen::with_defaults();
        let config = kitchen.prepare(&recipe, "1.0", &linux_profile()).unwrap();

        let folder = Kitchen::package_folder(Path::new("/out"), &config);
        assert_eq!(
            folder,
            Path::new("/out/hello/1.0").join(&config.package_id[..16])
        );
    }
}
