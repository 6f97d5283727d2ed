// src/batch/mod.rs

//! Batch builds over a directory of recipes
//!
//! A recipes directory holds one directory per package, named
//! `<prefix><package>`. Each package directory holds either a
//! `<version>/recipe.toml` or a catch-all `all/recipe.toml`.
//!
//! Every recipe is expanded into the common build matrix (`shared` when the
//! recipe declares it, times Debug and Release), all configurations are
//! resolved up front into a read-only [`ConfigCache`], and the entries are
//! then cooked in parallel. One failing entry never stops the others.

use crate::error::{Error, Result};
use crate::recipe::kitchen::CancelToken;
use crate::recipe::{Kitchen, Profile, Recipe, parse_recipe_file};
use crate::select::ResolvedConfiguration;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Recipe file name inside a version directory
pub const RECIPE_FILE: &str = "recipe.toml";

/// Version directory used when no directory matches the requested version
pub const FALLBACK_DIR: &str = "all";

/// Package whose version is given separately
pub const BASE_PACKAGE: &str = "base";

/// What to build
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub version: String,
    /// Version of the `base` package
    pub base_version: Option<String>,
    /// Only build this package (name without prefix)
    pub package: Option<String>,
    /// Directory name prefix (`boost_`)
    pub prefix: String,
    pub output_dir: PathBuf,
    /// Settings, options and environment shared by every entry
    pub profile: Profile,
    /// Parallel cooks
    pub jobs: usize,
}

impl BatchRequest {
    pub fn new(version: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            version: version.into(),
            base_version: None,
            package: None,
            prefix: String::new(),
            output_dir: output_dir.into(),
            profile: Profile::default(),
            jobs: 1,
        }
    }

    fn version_for(&self, package: &str) -> &str {
        match &self.base_version {
            Some(base) if package == BASE_PACKAGE => base,
            _ => &self.version,
        }
    }
}

/// A recipe found in the recipes directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeLocation {
    /// Package name without prefix
    pub package: String,
    pub version: String,
    pub recipe_file: PathBuf,
}

impl RecipeLocation {
    pub fn recipe_dir(&self) -> &Path {
        self.recipe_file.parent().unwrap_or(Path::new("."))
    }
}

/// Find the recipes a request covers, sorted by directory name
pub fn discover(recipes_dir: &Path, request: &BatchRequest) -> Result<Vec<RecipeLocation>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(recipes_dir)
        .map_err(|e| {
            Error::NotFound(format!(
                "recipes directory {}: {}",
                recipes_dir.display(),
                e
            ))
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut found = Vec::new();
    for dir in dirs {
        let Some(name) = dir.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let Some(package) = name.strip_prefix(&request.prefix) else {
            continue;
        };
        if package.is_empty() || request.package.as_deref().is_some_and(|p| p != package) {
            continue;
        }

        let version = request.version_for(package);
        let recipe_file = [dir.join(version), dir.join(FALLBACK_DIR)]
            .into_iter()
            .map(|d| d.join(RECIPE_FILE))
            .find(|f| f.is_file());

        match recipe_file {
            Some(recipe_file) => found.push(RecipeLocation {
                package: package.to_string(),
                version: version.to_string(),
                recipe_file,
            }),
            None => debug!("No recipe for {} {} in {}", package, version, dir.display()),
        }
    }

    if let Some(package) = &request.package
        && found.is_empty()
    {
        return Err(Error::NotFound(format!(
            "no recipe for package {} in {}",
            package,
            recipes_dir.display()
        )));
    }
    Ok(found)
}

/// The common build matrix for a recipe
///
/// Each variant is a profile derived from `base`.
pub fn build_matrix(recipe: &Recipe, base: &Profile) -> Vec<(String, Profile)> {
    let shared: Vec<Option<&str>> = if recipe.options.contains_key("shared") {
        vec![Some("False"), Some("True")]
    } else {
        vec![None]
    };

    let mut variants = Vec::new();
    for shared in &shared {
        for build_type in ["Debug", "Release"] {
            let mut profile = base.clone();
            profile.set_setting("build_type", build_type);
            let mut label = format!("build_type={}", build_type);
            if let Some(shared) = shared {
                profile.set_option("shared", shared);
                label = format!("shared={} {}", shared, label);
            }
            variants.push((label, profile));
        }
    }
    variants
}

/// One resolved build
#[derive(Debug)]
pub struct BatchEntry {
    pub location: RecipeLocation,
    pub recipe: Arc<Recipe>,
    pub variant: String,
    pub profile: Profile,
    pub config: ResolvedConfiguration,
}

/// Every configuration of a batch, resolved before anything is built
#[derive(Debug, Default)]
pub struct ConfigCache {
    pub entries: Vec<BatchEntry>,
}

impl ConfigCache {
    /// Resolve all configurations
    ///
    /// Recipes that fail to parse and variants that fail selection are
    /// reported as failures and left out of the cache. Variants with the
    /// same package id (header-only packages) are built once.
    pub fn resolve(
        locations: &[RecipeLocation],
        request: &BatchRequest,
        kitchen: &Kitchen,
    ) -> (Self, Vec<BatchFailure>) {
        let mut cache = Self::default();
        let mut failures = Vec::new();

        for location in locations {
            let recipe = match parse_recipe_file(&location.recipe_file) {
                Ok(recipe) => Arc::new(recipe),
                Err(e) => {
                    failures.push(BatchFailure {
                        reference: format!("{}/{}", location.package, location.version),
                        variant: String::new(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let mut seen = BTreeSet::new();
            for (variant, profile) in build_matrix(&recipe, &request.profile) {
                match kitchen.prepare(&recipe, &location.version, &profile) {
                    Ok(config) => {
                        if !seen.insert(config.package_id.clone()) {
                            debug!("{} {} duplicates an earlier variant", config.reference(), variant);
                            continue;
                        }
                        cache.entries.push(BatchEntry {
                            location: location.clone(),
                            recipe: Arc::clone(&recipe),
                            variant,
                            profile,
                            config,
                        });
                    }
                    Err(e) => failures.push(BatchFailure {
                        reference: format!("{}/{}", recipe.name(), location.version),
                        variant,
                        error: e.to_string(),
                    }),
                }
            }
        }

        (cache, failures)
    }
}

#[derive(Debug, Clone)]
pub struct BatchSuccess {
    pub reference: String,
    pub variant: String,
    pub package_folder: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub reference: String,
    pub variant: String,
    pub error: String,
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<BatchSuccess>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Build every recipe the request covers
pub fn run(
    recipes_dir: &Path,
    request: &BatchRequest,
    kitchen: &Kitchen,
    cancel: &CancelToken,
) -> Result<BatchReport> {
    let locations = discover(recipes_dir, request)?;
    info!("Found {} recipe(s) in {}", locations.len(), recipes_dir.display());

    let (cache, failed) = ConfigCache::resolve(&locations, request, kitchen);
    let cache = Arc::new(cache);
    info!(
        "Resolved {} configuration(s), {} rejected",
        cache.entries.len(),
        failed.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(request.jobs.max(1))
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    let results: Vec<std::result::Result<BatchSuccess, BatchFailure>> = pool.install(|| {
        cache
            .entries
            .par_iter()
            .map(|entry| {
                let reference = entry.config.reference();
                info!("Cooking {} [{}]", reference, entry.variant);

                kitchen
                    .cook_resolved(
                        &entry.recipe,
                        entry.location.recipe_dir(),
                        &entry.config,
                        &entry.profile,
                        &request.output_dir,
                        cancel,
                    )
                    .map(|result| BatchSuccess {
                        reference: reference.clone(),
                        variant: entry.variant.clone(),
                        package_folder: result.package_folder,
                    })
                    .map_err(|e| {
                        warn!("{} [{}] failed: {}", reference, entry.variant, e);
                        BatchFailure {
                            reference: reference.clone(),
                            variant: entry.variant.clone(),
                            error: e.to_string(),
                        }
                    })
            })
            .collect()
    });

    let mut report = BatchReport {
        succeeded: Vec::new(),
        failed,
    };
    for result in results {
        match result {
            Ok(success) => report.succeeded.push(success),
            Err(failure) => report.failed.push(failure),
        }
    }

    info!(
        "Batch finished: {} succeeded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::KitchenConfig;
    use tempfile::TempDir;

    const LIBRARY: &str = r#"
[package]
name = "%NAME%"
license = "BSL-1.0"

[sources."%VERSION%"]
url = "/nonexistent/src.tar.gz"
checksum = "sha256:0000000000000000000000000000000000000000000000000000000000000000"

[options.shared]
values = [true, false]
default = false

[build]
system = "autotools"
"#;

    fn write_recipe(root: &Path, dir: &str, version_dir: &str, name: &str, version: &str) {
        let path = root.join(dir).join(version_dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(
            path.join(RECIPE_FILE),
            LIBRARY.replace("%NAME%", name).replace("%VERSION%", version),
        )
        .unwrap();
    }

    fn linux_profile() -> Profile {
        let mut profile = Profile::default();
        profile.set_setting("os", "Linux");
        profile.set_setting("arch", "x86_64");
        profile.set_setting("compiler", "gcc");
        profile.set_setting("compiler.version", "11");
        profile
    }

    #[test]
    fn test_discover_with_fallback_and_base_version() {
        let tmp = TempDir::new().unwrap();
        write_recipe(tmp.path(), "boost_base", "all", "boost_base", "1.0.0");
        write_recipe(tmp.path(), "boost_core", "1.76.0", "boost_core", "1.76.0");
        write_recipe(tmp.path(), "boost_core", "all", "boost_core", "1.76.0");
        write_recipe(tmp.path(), "boost_config", "all", "boost_config", "1.76.0");
        write_recipe(tmp.path(), "zlib", "all", "zlib", "1.2.11");

        let mut request = BatchRequest::new("1.76.0", tmp.path().join("out"));
        request.prefix = "boost_".to_string();
        request.base_version = Some("1.0.0".to_string());

        let found = discover(tmp.path(), &request).unwrap();
        let summary: Vec<(&str, &str)> = found
            .iter()
            .map(|l| (l.package.as_str(), l.version.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![("base", "1.0.0"), ("config", "1.76.0"), ("core", "1.76.0")]
        );
        assert!(found[2].recipe_file.ends_with("boost_core/1.76.0/recipe.toml"));
        assert!(found[1].recipe_file.ends_with("boost_config/all/recipe.toml"));
    }

    #[test]
    fn test_discover_single_package() {
        let tmp = TempDir::new().unwrap();
        write_recipe(tmp.path(), "boost_core", "all", "boost_core", "1.76.0");

        let mut request = BatchRequest::new("1.76.0", tmp.path().join("out"));
        request.prefix = "boost_".to_string();
        request.package = Some("core".to_string());
        assert_eq!(discover(tmp.path(), &request).unwrap().len(), 1);

        request.package = Some("json".to_string());
        assert!(matches!(discover(tmp.path(), &request), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_common_build_matrix() {
        let tmp = TempDir::new().unwrap();
        write_recipe(tmp.path(), "boost_core", "all", "boost_core", "1.76.0");
        let recipe = parse_recipe_file(&tmp.path().join("boost_core/all/recipe.toml")).unwrap();

        let variants = build_matrix(&recipe, &linux_profile());
        let labels: Vec<&str> = variants.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "shared=False build_type=Debug",
                "shared=False build_type=Release",
                "shared=True build_type=Debug",
                "shared=True build_type=Release",
            ]
        );
    }

    #[test]
    fn test_failures_are_collected_per_entry() {
        let tmp = TempDir::new().unwrap();
        write_recipe(tmp.path(), "boost_core", "all", "boost_core", "1.76.0");
        let broken = tmp.path().join("boost_broken/all");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(RECIPE_FILE), "not a recipe").unwrap();

        let mut request = BatchRequest::new("1.76.0", tmp.path().join("out"));
        request.prefix = "boost_".to_string();
        request.profile = linux_profile();
        request.jobs = 2;

        let kitchen = Kitchen::new(KitchenConfig::isolated(tmp.path()));
        let report = run(tmp.path(), &request, &kitchen, &CancelToken::new()).unwrap();

        // One parse failure plus four source failures (the archive is missing)
        assert!(!report.is_success());
        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), 5);
        assert!(report.failed.iter().any(|f| f.reference == "broken/1.76.0"));
    }
}
