// src/recipe/kitchen/plan.rs

//! Build plans
//!
//! A [`BuildPlan`] is everything the driver will do for one resolved
//! configuration, written down before anything runs: patches, in-file
//! replacements, tool invocations with their environment overlay, copy
//! rules and cleanup globs. Planning is pure; the same inputs always give
//! the same plan.

use super::info::PackageInfo;
use super::process::ToolCommand;
use super::KitchenConfig;
use crate::error::{Error, Result};
use crate::recipe::Recipe;
use crate::select::{ResolvedConfiguration, Toolchain, tables};
use crate::settings::Arch;
use glob::Pattern;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Variables that accumulate (profile and recipe values are appended)
const FLAG_VARS: &[&str] = &["CFLAGS", "CXXFLAGS", "CPPFLAGS", "LDFLAGS"];

/// Folders one build works with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Folders {
    /// Unpacked, verified sources
    pub source: PathBuf,
    /// Where the build tool runs; may equal `source`
    pub build: PathBuf,
    /// Final package location
    pub package: PathBuf,
    /// Directory holding the recipe and its local patches
    pub recipe_dir: PathBuf,
}

impl Folders {
    /// In-source build
    pub fn in_source(source: &Path, package: &Path, recipe_dir: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            build: source.to_path_buf(),
            package: package.to_path_buf(),
            recipe_dir: recipe_dir.to_path_buf(),
        }
    }

    /// Temporary install root next to the package folder
    pub fn staging(&self) -> PathBuf {
        let name = self
            .package
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "package".to_string());
        let parent = self.package.parent().unwrap_or(Path::new("."));
        parent.join(format!(".{}.staging", name))
    }
}

/// Where a patch file comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PatchSource {
    Local { path: PathBuf },
    Remote { url: String, checksum: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchStep {
    /// Name as written in the recipe
    pub label: String,
    pub source: PatchSource,
    pub strip: u32,
    /// Directory the patch is applied in
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceStep {
    /// Absolute glob
    pub files: String,
    pub from: String,
    pub to: String,
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyStep {
    /// Glob matched against paths relative to `src`
    pub pattern: String,
    pub src: PathBuf,
    /// Directory relative to the package root
    pub dst: String,
    pub keep_path: bool,
}

/// Everything the driver does for one configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub name: String,
    pub version: String,
    pub reference: String,
    pub folders: Folders,
    pub staging: PathBuf,
    pub patches: Vec<PatchStep>,
    pub replacements: Vec<ReplaceStep>,
    pub build_steps: Vec<ToolCommand>,
    pub install_steps: Vec<ToolCommand>,
    /// Environment overlay shared by every tool invocation
    pub env: BTreeMap<String, String>,
    pub copies: Vec<CopyStep>,
    /// Globs relative to the package root, removed after install
    pub cleanup: Vec<String>,
    /// Globs that must match after install
    pub expect: Vec<String>,
    pub info: PackageInfo,
}

impl BuildPlan {
    pub fn new(
        config: &ResolvedConfiguration,
        recipe: &Recipe,
        folders: Folders,
        kitchen: &KitchenConfig,
        profile_env: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let staging = folders.staging();
        let vars = template_vars(config, &folders, &staging);
        let sub = |s: &str| recipe.substitute(s, &vars);

        let workdir = match &recipe.build.workdir {
            Some(dir) => folders.build.join(sub(dir)),
            None => folders.build.clone(),
        };

        let env = build_env(config, recipe, &workdir, profile_env, &sub);

        let patches = recipe
            .patches_for(&config.version)
            .iter()
            .map(|patch| {
                let source = if patch.is_remote() {
                    let checksum = patch.checksum.clone().ok_or_else(|| Error::Patch {
                        patch: patch.file.clone(),
                        message: "remote patch has no checksum".to_string(),
                    })?;
                    PatchSource::Remote {
                        url: patch.file.clone(),
                        checksum,
                    }
                } else {
                    PatchSource::Local {
                        path: folders.recipe_dir.join(&patch.file),
                    }
                };
                let dir = match &patch.base_path {
                    Some(base) => folders.build.join(sub(base)),
                    None => folders.build.clone(),
                };
                Ok(PatchStep {
                    label: patch.file.clone(),
                    source,
                    strip: patch.strip,
                    dir,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let replacements = recipe
            .build
            .replace
            .iter()
            .filter(|rule| {
                rule.when_disabled
                    .as_deref()
                    .is_none_or(|opt| config.is_disabled(opt))
                    && rule
                        .when_enabled
                        .as_deref()
                        .is_none_or(|opt| config.is_enabled(opt))
            })
            .map(|rule| ReplaceStep {
                files: rooted_glob(&folders.build, &sub(&rule.files)),
                from: sub(&rule.from),
                to: sub(&rule.to),
                strict: rule.strict,
            })
            .collect();

        let (build_steps, install_steps) =
            tool_steps(config, recipe, &folders, &workdir, &staging, kitchen, &env, &sub)?;

        let copies = recipe
            .install
            .copy
            .iter()
            .map(|rule| CopyStep {
                pattern: sub(&rule.pattern),
                src: folders.build.join(sub(&rule.src)),
                dst: sub(&rule.dst),
                keep_path: rule.keep_path,
            })
            .collect();

        let mut cleanup = Vec::new();
        if !kitchen.keep_libtool_files {
            cleanup.push("lib/*.la".to_string());
        }
        cleanup.push("lib/pkgconfig".to_string());
        cleanup.extend(recipe.install.remove.iter().map(|r| sub(r)));

        let info = PackageInfo::new(recipe, config, &folders.package);

        Ok(Self {
            name: config.name.clone(),
            version: config.version.clone(),
            reference: config.reference(),
            folders,
            staging,
            patches,
            replacements,
            build_steps,
            install_steps,
            env,
            copies,
            cleanup,
            expect: recipe.install.expect.iter().map(|e| sub(e)).collect(),
            info,
        })
    }
}

/// Absolute glob for `pattern` below `root`, with `root` matched literally
pub(crate) fn rooted_glob(root: &Path, pattern: &str) -> String {
    let root = Pattern::escape(&root.to_string_lossy());
    if pattern.is_empty() || pattern == "." {
        root
    } else {
        format!("{}/{}", root.trim_end_matches('/'), pattern)
    }
}

fn template_vars(
    config: &ResolvedConfiguration,
    folders: &Folders,
    staging: &Path,
) -> BTreeMap<String, String> {
    let mut vars = config.variables.clone();
    let mut path = |key: &str, value: &Path| {
        vars.insert(key.to_string(), value.to_string_lossy().to_string());
    };
    path("package_folder", &folders.package);
    path("source_folder", &folders.source);
    path("build_folder", &folders.build);
    path("staging_folder", staging);
    vars
}

fn append(env: &mut BTreeMap<String, String>, key: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    env.entry(key.to_string())
        .and_modify(|existing| {
            existing.push(' ');
            existing.push_str(value);
        })
        .or_insert_with(|| value.to_string());
}

/// Merge one layer into the overlay
///
/// Flag variables are appended, everything else overrides.
fn layer(env: &mut BTreeMap<String, String>, values: impl IntoIterator<Item = (String, String)>) {
    for (key, value) in values {
        if FLAG_VARS.contains(&key.as_str()) {
            append(env, &key, &value);
        } else {
            env.insert(key, value);
        }
    }
}

fn build_env(
    config: &ResolvedConfiguration,
    recipe: &Recipe,
    workdir: &Path,
    profile_env: &BTreeMap<String, String>,
    sub: &dyn Fn(&str) -> String,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    let settings = &config.settings;

    match &config.toolchain {
        Toolchain::Autotools {
            msvc_wrappers: true,
        } => {
            let compile = workdir.join("compile");
            let ar_lib = workdir.join("ar-lib");
            let runtime = settings
                .compiler
                .runtime
                .map(|r| format!("-{}", r))
                .unwrap_or_default();

            env.insert("CC".to_string(), format!("{} cl -nologo", compile.display()));
            env.insert("CXX".to_string(), format!("{} cl -nologo", compile.display()));
            env.insert("LD".to_string(), "link".to_string());
            env.insert("NM".to_string(), "dumpbin -symbols".to_string());
            env.insert("STRIP".to_string(), ":".to_string());
            env.insert("AR".to_string(), format!("{} lib", ar_lib.display()));
            env.insert("RANLIB".to_string(), ":".to_string());
            append(&mut env, "CFLAGS", &format!("{} -FS", runtime));
            append(&mut env, "CXXFLAGS", &format!("{} -FS -EHsc", runtime));
        }
        Toolchain::Autotools { .. } => {
            let mut flags = tables::optimization_flags(settings.build_type).to_string();
            if config.is_enabled("fPIC") {
                flags.push_str(" -fPIC");
            }
            if config.is_enabled("lto") {
                flags.push_str(" -flto");
            }
            match settings.arch {
                Arch::X86 => flags.push_str(" -m32"),
                Arch::X86_64 => flags.push_str(" -m64"),
                Arch::Armv8 => {}
            }
            append(&mut env, "CFLAGS", &flags);
            append(&mut env, "CXXFLAGS", &flags);
        }
        Toolchain::HeaderOnly | Toolchain::Make { .. } | Toolchain::MsBuild { .. } => {}
    }

    layer(
        &mut env,
        profile_env.iter().map(|(k, v)| (k.clone(), v.clone())),
    );
    layer(
        &mut env,
        recipe
            .build
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), sub(v))),
    );
    env.insert("PANTRY_REFERENCE".to_string(), config.reference());
    env
}

#[allow(clippy::too_many_arguments)]
fn tool_steps(
    config: &ResolvedConfiguration,
    recipe: &Recipe,
    folders: &Folders,
    workdir: &Path,
    staging: &Path,
    kitchen: &KitchenConfig,
    env: &BTreeMap<String, String>,
    sub: &dyn Fn(&str) -> String,
) -> Result<(Vec<ToolCommand>, Vec<ToolCommand>)> {
    let jobs = format!("-j{}", kitchen.jobs.max(1));

    let steps = match &config.toolchain {
        Toolchain::HeaderOnly => (Vec::new(), Vec::new()),
        Toolchain::Autotools { .. } => {
            let mut build = Vec::new();
            if recipe.build.autoreconf {
                build.push(ToolCommand::new("autoreconf", workdir).arg("-fiv").envs(env));
            }

            let (shared, pic) = (
                if config.is_enabled("shared") {
                    ["--enable-shared", "--disable-static"]
                } else {
                    ["--disable-shared", "--enable-static"]
                },
                if config.is_enabled("fPIC") || config.is_enabled("shared") {
                    "--with-pic"
                } else {
                    "--without-pic"
                },
            );

            let configure = ToolCommand::new("sh", workdir)
                .arg("./configure")
                .arg(format!("--prefix={}", folders.package.display()))
                .args(shared)
                .arg(pic)
                .args(recipe.build.configure_args.iter().map(|a| sub(a)))
                .envs(env);
            build.push(configure);
            build.push(ToolCommand::new("make", workdir).arg(jobs).envs(env));

            let install = ToolCommand::new("make", workdir)
                .arg("install")
                .arg(format!("prefix={}", staging.display()))
                .envs(env);
            (build, vec![install])
        }
        Toolchain::Make { .. } => {
            let make = recipe.build.make.as_ref().ok_or_else(|| {
                Error::Parse(format!("{} has no [build.make] section", recipe.name()))
            })?;
            let mut cmd = ToolCommand::new("make", workdir.join(sub(&make.dir)));
            if let Some(target) = &make.target {
                cmd = cmd.arg(sub(target));
            }
            let cmd = cmd
                .args(make.args.iter().map(|a| sub(a)))
                .arg(jobs)
                .envs(env);
            (vec![cmd], Vec::new())
        }
        Toolchain::MsBuild {
            platform,
            configuration,
            ..
        } => {
            let msbuild = recipe.build.msbuild.as_ref().ok_or_else(|| {
                Error::Parse(format!("{} has no [build.msbuild] section", recipe.name()))
            })?;
            let cmd = ToolCommand::new("msbuild", workdir.join(sub(&msbuild.dir)))
                .arg(sub(&msbuild.solution))
                .arg(format!("/p:Configuration={}", configuration))
                .arg(format!("/p:Platform={}", platform))
                .arg("/m")
                .args(msbuild.args.iter().map(|a| sub(a)))
                .envs(env);
            (vec![cmd], Vec::new())
        }
    };
    Ok(steps)
}
