// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipes are TOML files that describe how to fetch, configure, build and
//! install one native package across many versions. Sources and patches
//! are keyed by version; everything else applies to all of them.

use crate::error::{Error, Result};
use crate::recipe::kitchen::SourceRef;
use crate::version::VersionConstraint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A complete recipe for building a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Package metadata
    pub package: PackageSection,

    /// Source per version
    #[serde(default)]
    pub sources: BTreeMap<String, SourceEntry>,

    /// Patches per version, applied in order
    #[serde(default)]
    pub patches: BTreeMap<String, Vec<PatchInfo>>,

    /// Declared options
    #[serde(default)]
    pub options: BTreeMap<String, OptionDecl>,

    #[serde(default)]
    pub requirements: RequirementsSection,

    /// Requirements added when a boolean option is enabled
    #[serde(default)]
    pub requires_if: BTreeMap<String, Vec<String>>,

    /// Version-dependent build tree layout
    #[serde(default)]
    pub layout: LayoutSection,

    /// Build instructions
    #[serde(default)]
    pub build: BuildSection,

    /// Install (copy) rules
    #[serde(default)]
    pub install: InstallSection,

    /// Consumer-facing package information
    #[serde(default)]
    pub info: InfoSection,

    /// Variables for substitution (optional)
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl Recipe {
    /// Substitute variables in a string
    ///
    /// Replaces `%(name)s` patterns with values from `vars` first, then
    /// from the `[variables]` section. Unknown names are left in place.
    pub fn substitute(&self, template: &str, vars: &BTreeMap<String, String>) -> String {
        let mut result = template.to_string();

        for (key, value) in vars.iter().chain(self.variables.iter()) {
            let pattern = format!("%({})s", key);
            if result.contains(&pattern) {
                result = result.replace(&pattern, value);
            }
        }

        result
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn is_header_only(&self) -> bool {
        self.package.kind == PackageKind::HeaderOnly
    }

    /// Versions with a declared source
    pub fn versions(&self) -> Vec<&str> {
        self.sources.keys().map(|v| v.as_str()).collect()
    }

    /// Source reference for a version
    pub fn source_for(&self, version: &str) -> Result<SourceRef> {
        let entry = self.sources.get(version).ok_or_else(|| {
            Error::NotFound(format!(
                "{} has no source for version {}",
                self.package.name, version
            ))
        })?;
        entry.to_source_ref()
    }

    /// Patches for a version (empty when none are declared)
    pub fn patches_for(&self, version: &str) -> &[PatchInfo] {
        self.patches.get(version).map(|p| p.as_slice()).unwrap_or(&[])
    }

    /// Whether the recipe declares a given setting
    pub fn declares_setting(&self, key: &str) -> bool {
        self.package.settings.iter().any(|s| s == key)
    }
}

/// What kind of artifact the recipe produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageKind {
    #[default]
    Library,
    Application,
    HeaderOnly,
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSection {
    /// Package name
    pub name: String,

    #[serde(default)]
    pub kind: PackageKind,

    /// License identifier (SPDX)
    #[serde(default)]
    pub license: Option<String>,

    /// Homepage URL
    #[serde(default)]
    pub homepage: Option<String>,

    /// Full description
    #[serde(default)]
    pub description: Option<String>,

    /// Settings the package id depends on
    #[serde(default = "default_settings")]
    pub settings: Vec<String>,

    /// Whether building on a different machine than the target is supported
    #[serde(default = "default_true")]
    pub cross_build: bool,
}

fn default_settings() -> Vec<String> {
    ["os", "arch", "compiler", "build_type"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

/// Where a version's sources come from
///
/// Either `url` + `checksum` or `git` + `revision`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl SourceEntry {
    pub fn to_source_ref(&self) -> Result<SourceRef> {
        match (&self.url, &self.checksum, &self.git, &self.revision) {
            (Some(url), Some(checksum), None, None) => Ok(SourceRef::Archive {
                url: url.clone(),
                checksum: checksum.clone(),
            }),
            (None, None, Some(url), Some(revision)) => Ok(SourceRef::Git {
                url: url.clone(),
                revision: revision.clone(),
            }),
            (Some(_), None, None, None) => Err(Error::Parse(
                "source url has no checksum".to_string(),
            )),
            (None, None, Some(_), None) => Err(Error::Parse(
                "git source has no revision".to_string(),
            )),
            _ => Err(Error::Parse(
                "source must have either url + checksum or git + revision".to_string(),
            )),
        }
    }
}

/// Information about a single patch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchInfo {
    /// Patch file path, relative to the recipe directory
    pub file: String,

    /// Strip level for patch (default: 1)
    #[serde(default = "default_strip")]
    pub strip: u32,

    /// Directory within the sources the patch applies to
    #[serde(default)]
    pub base_path: Option<String>,

    /// Checksum, required for remote patches
    #[serde(default)]
    pub checksum: Option<String>,
}

impl PatchInfo {
    pub fn is_remote(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }
}

fn default_strip() -> u32 {
    1
}

/// A single option value as written in the recipe
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Text(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(_) => None,
        }
    }

    /// Whether a raw command-line value names this value
    ///
    /// Booleans accept `true`/`false` in any case; text must match exactly.
    pub fn matches_raw(&self, raw: &str) -> bool {
        match self {
            Self::Bool(b) => raw.trim().eq_ignore_ascii_case(if *b { "true" } else { "false" }),
            Self::Text(s) => s == raw.trim(),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Declared option: allowed values and the default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDecl {
    pub values: Vec<OptionValue>,
    pub default: OptionValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequirementsSection {
    /// Minimum C++ standard (`"11"`, `"17"`)
    #[serde(default)]
    pub min_cppstd: Option<String>,

    /// Unconditional requirements (`name/version`)
    #[serde(default)]
    pub requires: Vec<String>,
}

/// A value chosen by recipe version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatedValue {
    /// Version constraint; absent matches every version
    #[serde(default)]
    pub when: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutSection {
    /// Generated makefile directory prefix; first matching rule wins
    #[serde(default)]
    pub make_prefix: Vec<GatedValue>,

    /// Versions that ship project files for the newest Visual Studio
    #[serde(default)]
    pub newest_toolset: Option<String>,

    /// Toolsets whose solutions only have Win32 targets
    #[serde(default)]
    pub win32_only_toolsets: Vec<String>,
}

impl LayoutSection {
    /// Resolve the makefile directory prefix for a version
    pub fn make_prefix_for(&self, version: &str) -> Result<String> {
        for rule in &self.make_prefix {
            let matches = match &rule.when {
                Some(constraint) => VersionConstraint::parse(constraint)?.satisfies_str(version)?,
                None => true,
            };
            if matches {
                return Ok(rule.value.clone());
            }
        }
        Ok("gmake".to_string())
    }

    /// Whether the newest Visual Studio toolset applies to a version
    pub fn allows_newest_toolset(&self, version: &str) -> Result<bool> {
        match &self.newest_toolset {
            Some(constraint) => VersionConstraint::parse(constraint)?.satisfies_str(version),
            None => Ok(true),
        }
    }
}

/// Which external build system drives the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
    /// Nothing to build, only copy rules
    #[default]
    None,
    /// `./configure && make && make install`
    Autotools,
    /// Pre-generated makefiles
    Make,
    /// Pre-generated Visual Studio solutions
    Msbuild,
    /// Pre-generated makefiles, or solutions under Visual Studio
    Premake,
}

/// Build instructions section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSection {
    #[serde(default)]
    pub system: BuildSystem,

    /// Run `autoreconf -fiv` before configure
    #[serde(default)]
    pub autoreconf: bool,

    /// Extra configure arguments (templated)
    #[serde(default)]
    pub configure_args: Vec<String>,

    /// Working directory within source (relative path)
    #[serde(default)]
    pub workdir: Option<String>,

    #[serde(default)]
    pub make: Option<MakeSection>,

    #[serde(default)]
    pub msbuild: Option<MsBuildSection>,

    /// In-file replacements applied after patches
    #[serde(default)]
    pub replace: Vec<ReplaceRule>,

    /// Environment variables to set during build
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeSection {
    /// Directory holding the makefiles (templated)
    #[serde(default = "default_dir")]
    pub dir: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsBuildSection {
    /// Directory holding the solution (templated)
    #[serde(default = "default_dir")]
    pub dir: String,
    pub solution: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_dir() -> String {
    ".".to_string()
}

/// Replace text in files matching a glob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceRule {
    /// Glob relative to the build folder (templated)
    pub files: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// Apply only when this boolean option resolved to false
    #[serde(default)]
    pub when_disabled: Option<String>,
    /// Apply only when this boolean option resolved to true
    #[serde(default)]
    pub when_enabled: Option<String>,
    /// Fail when no file contains `from`
    #[serde(default = "default_true")]
    pub strict: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallSection {
    #[serde(default)]
    pub copy: Vec<CopyRule>,

    /// Paths or globs removed from the package after install
    #[serde(default)]
    pub remove: Vec<String>,

    /// Globs that must match at least one file in the package
    #[serde(default)]
    pub expect: Vec<String>,
}

/// Copy files matching `pattern` under `src` into `dst`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyRule {
    pub pattern: String,
    /// Directory relative to the build folder
    #[serde(default = "default_dir")]
    pub src: String,
    /// Directory relative to the package folder
    pub dst: String,
    /// Keep the path relative to `src` below `dst`
    #[serde(default)]
    pub keep_path: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfoSection {
    #[serde(default)]
    pub libs: Vec<String>,

    /// System libraries per OS name
    #[serde(default)]
    pub system_libs: BTreeMap<String, Vec<String>>,

    /// Defines per enabled boolean option
    #[serde(default)]
    pub defines: BTreeMap<String, Vec<String>>,

    /// Names for generators (`cmake`, `pkgconfig`)
    #[serde(default)]
    pub names: BTreeMap<String, String>,

    /// Add `<package>/bin` to `PATH` for consumers
    #[serde(default)]
    pub bin_path: bool,
}
