// src/select/mod.rs

//! Build configuration selection
//!
//! [`select`] turns a recipe, a version and loose settings/options into a
//! [`ResolvedConfiguration`]: typed settings, pruned options, the toolchain
//! to drive and the template variables recipe strings refer to. It is a
//! pure function. Every configuration error surfaces here, before any
//! source is fetched or any tool runs.

mod options;
pub mod tables;

pub use options::{RawOptions, ResolvedOptions, cppstd_rank};
pub use tables::ToolsetPolicy;

use crate::error::{Error, Result};
use crate::hash::{HashAlgorithm, Hasher};
use crate::recipe::{BuildSystem, OptionValue, Recipe};
use crate::settings::{CompilerKind, Os, RawSettings, Settings};
use crate::version::RecipeVersion;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// The external build system a configuration is driven by
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Toolchain {
    /// Nothing to build; install rules only
    HeaderOnly,
    /// `configure` + `make`, with MSVC wrapper scripts under Visual Studio
    Autotools { msvc_wrappers: bool },
    /// Pre-generated makefiles in `make_dir`
    Make { make_dir: String, config: String },
    /// Visual Studio solution for `toolset`
    MsBuild {
        toolset: String,
        platform: String,
        configuration: String,
    },
}

impl Toolchain {
    /// Directory name the generated build files live in, if any
    pub fn build_dir_token(&self) -> Option<&str> {
        match self {
            Self::Make { make_dir, .. } => Some(make_dir),
            Self::MsBuild { toolset, .. } => Some(toolset),
            Self::HeaderOnly | Self::Autotools { .. } => None,
        }
    }
}

/// Everything the driver needs to know about one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfiguration {
    pub name: String,
    pub version: String,
    pub settings: Settings,
    pub options: ResolvedOptions,
    pub toolchain: Toolchain,
    /// `%(name)s` template variables
    pub variables: BTreeMap<String, String>,
    pub requires: Vec<String>,
    pub package_id: String,
    pub header_only: bool,
}

impl ResolvedConfiguration {
    /// Whether a boolean option resolved to true
    pub fn is_enabled(&self, option: &str) -> bool {
        self.options.get(option) == Some(&OptionValue::Bool(true))
    }

    /// Whether a boolean option resolved to false
    ///
    /// Pruned options are neither enabled nor disabled.
    pub fn is_disabled(&self, option: &str) -> bool {
        self.options.get(option) == Some(&OptionValue::Bool(false))
    }

    /// `name/version` reference
    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// Resolve a configuration for one recipe version
pub fn select(
    recipe: &Recipe,
    version: &str,
    settings: &RawSettings,
    options: &RawOptions,
    policy: ToolsetPolicy,
) -> Result<ResolvedConfiguration> {
    if !recipe.sources.contains_key(version) {
        return Err(Error::NotFound(format!(
            "{} has no version {} (available: {})",
            recipe.name(),
            version,
            recipe.versions().join(", ")
        )));
    }
    RecipeVersion::parse(version)?;

    let settings = settings.parse()?;
    check_compiler_os(&settings)?;

    if !recipe.package.cross_build && settings.is_cross_building() {
        return Err(Error::UnsupportedPlatform(format!(
            "{} cannot be cross-built ({} {} host, {} {} target)",
            recipe.name(),
            settings.os_build.unwrap_or(settings.os),
            settings.arch_build.unwrap_or(settings.arch),
            settings.os,
            settings.arch
        )));
    }
    options::check_cppstd(recipe, &settings)?;

    let resolved = options::resolve_options(recipe, &settings, options)?;

    let mut variables = BTreeMap::new();
    variables.insert("name".to_string(), recipe.name().to_string());
    variables.insert("version".to_string(), version.to_string());
    variables.insert("os".to_string(), settings.os.to_string());
    variables.insert("arch".to_string(), settings.arch.to_string());
    variables.insert("build_type".to_string(), settings.build_type.to_string());

    let toolchain = select_toolchain(recipe, version, &settings, policy, &mut variables)?;
    let requires = options::resolve_requirements(recipe, &resolved);
    let header_only = recipe.is_header_only();
    let package_id = package_id(recipe, version, &settings, &resolved, header_only);

    debug!(
        "Selected {}/{}: {:?} (package id {})",
        recipe.name(),
        version,
        toolchain,
        package_id
    );

    Ok(ResolvedConfiguration {
        name: recipe.name().to_string(),
        version: version.to_string(),
        settings,
        options: resolved,
        toolchain,
        variables,
        requires,
        package_id,
        header_only,
    })
}

fn check_compiler_os(settings: &Settings) -> Result<()> {
    let ok = match settings.compiler.kind {
        CompilerKind::VisualStudio => settings.os == Os::Windows,
        CompilerKind::AppleClang => settings.os == Os::Macos,
        CompilerKind::Gcc | CompilerKind::Clang => true,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::UnsupportedPlatform(format!(
            "compiler {} does not target {}",
            settings.compiler.kind, settings.os
        )))
    }
}

fn select_toolchain(
    recipe: &Recipe,
    version: &str,
    settings: &Settings,
    policy: ToolsetPolicy,
    vars: &mut BTreeMap<String, String>,
) -> Result<Toolchain> {
    if recipe.is_header_only() {
        return Ok(Toolchain::HeaderOnly);
    }

    let msvc = settings.compiler.kind.is_msvc();
    match recipe.build.system {
        BuildSystem::None => Ok(Toolchain::HeaderOnly),
        BuildSystem::Autotools => Ok(Toolchain::Autotools {
            msvc_wrappers: msvc,
        }),
        BuildSystem::Make => make_toolchain(recipe, version, settings, vars),
        BuildSystem::Premake if !msvc => make_toolchain(recipe, version, settings, vars),
        BuildSystem::Msbuild | BuildSystem::Premake => {
            if !msvc {
                return Err(Error::UnsupportedPlatform(format!(
                    "{} builds with MSBuild, which needs Visual Studio (got {})",
                    recipe.name(),
                    settings.compiler.kind
                )));
            }
            msbuild_toolchain(recipe, version, settings, policy, vars)
        }
    }
}

fn make_toolchain(
    recipe: &Recipe,
    version: &str,
    settings: &Settings,
    vars: &mut BTreeMap<String, String>,
) -> Result<Toolchain> {
    let prefix = recipe.layout.make_prefix_for(version)?;
    let platform = tables::make_platform(settings.os);
    let make_dir = format!("{}.{}", prefix, platform);
    let config = tables::make_config(settings.os, settings.arch, settings.build_type)?;

    vars.insert("make_prefix".to_string(), prefix);
    vars.insert("make_platform".to_string(), platform.to_string());
    vars.insert("make_dir".to_string(), make_dir.clone());
    vars.insert("make_config".to_string(), config.clone());

    Ok(Toolchain::Make { make_dir, config })
}

fn msbuild_toolchain(
    recipe: &Recipe,
    version: &str,
    settings: &Settings,
    policy: ToolsetPolicy,
    vars: &mut BTreeMap<String, String>,
) -> Result<Toolchain> {
    let allow_newest = recipe.layout.allows_newest_toolset(version)?;
    let toolset = tables::vs_toolset(&settings.compiler.version, allow_newest, policy)?;
    let platform =
        tables::msbuild_platform(settings.arch, &toolset, &recipe.layout.win32_only_toolsets)?;
    let configuration = tables::msbuild_configuration(settings.build_type);

    vars.insert("toolset".to_string(), toolset.clone());
    vars.insert("toolset_dir".to_string(), toolset.clone());
    vars.insert("msbuild_platform".to_string(), platform.to_string());
    vars.insert("msbuild_configuration".to_string(), configuration.to_string());

    Ok(Toolchain::MsBuild {
        toolset,
        platform: platform.to_string(),
        configuration: configuration.to_string(),
    })
}

/// Identity of a binary package
///
/// Header-only packages ignore settings, so one id serves every platform.
fn package_id(
    recipe: &Recipe,
    version: &str,
    settings: &Settings,
    options: &ResolvedOptions,
    header_only: bool,
) -> String {
    let mut hasher = Hasher::new(HashAlgorithm::Sha256);
    let mut line = |key: &str, value: &str| {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    };

    line("name", recipe.name());
    line("version", version);
    if !header_only {
        for key in &recipe.package.settings {
            if let Some(value) = settings.value_of(key) {
                line(&format!("settings.{}", key), &value);
            }
        }
    }
    for (name, value) in options {
        line(&format!("options.{}", name), &value.to_string());
    }

    hasher.finalize().value
}
