// src/select/tables.rs

//! Static platform tables
//!
//! Every lookup here is an exhaustive `match` over the typed settings, so
//! adding a variant to [`Os`] or [`Arch`] fails to compile until each table
//! says what to do with it. Values a table cannot map are errors, never
//! silent defaults.

use crate::error::{Error, Result};
use crate::settings::{Arch, BuildType, Os};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// What to do with a Visual Studio version missing from the toolset table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolsetPolicy {
    /// Fall back to the nearest known toolset and log a warning
    #[default]
    Nearest,
    /// Reject unknown versions
    Strict,
}

impl fmt::Display for ToolsetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

impl std::str::FromStr for ToolsetPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "strict" => Ok(Self::Strict),
            other => Err(Error::Parse(format!("unknown toolset policy: {}", other))),
        }
    }
}

/// Visual Studio release year for a compiler major version
fn vs_year(major: u32) -> Option<u16> {
    match major {
        12 => Some(2013),
        14 => Some(2015),
        15 => Some(2017),
        16 => Some(2019),
        17 => Some(2022),
        _ => None,
    }
}

/// Known compiler majors, oldest first
const VS_MAJORS: [u32; 5] = [12, 14, 15, 16, 17];

/// Map a Visual Studio compiler version to its build directory (`vs2019`)
///
/// `allow_newest` gates the newest toolset (`vs2022`): recipe versions that
/// predate its project files treat 17 as unknown.
pub fn vs_toolset(version: &str, allow_newest: bool, policy: ToolsetPolicy) -> Result<String> {
    let major: u32 = version
        .split('.')
        .next()
        .and_then(|m| m.trim().parse().ok())
        .ok_or_else(|| {
            Error::UnsupportedPlatform(format!(
                "Visual Studio version '{}' is not numeric",
                version
            ))
        })?;

    let newest = VS_MAJORS[VS_MAJORS.len() - 1];
    let known = |m: u32| allow_newest || m != newest;

    if known(major)
        && let Some(year) = vs_year(major)
    {
        return Ok(format!("vs{}", year));
    }

    match policy {
        ToolsetPolicy::Strict => Err(Error::UnsupportedPlatform(format!(
            "no Visual Studio toolset for compiler.version={}",
            version
        ))),
        ToolsetPolicy::Nearest => {
            // Ties go to the older toolset.
            let nearest = VS_MAJORS
                .iter()
                .copied()
                .filter(|m| known(*m))
                .min_by_key(|m| (m.abs_diff(major), *m))
                .and_then(vs_year)
                .ok_or_else(|| {
                    Error::UnsupportedPlatform(format!(
                        "no Visual Studio toolset for compiler.version={}",
                        version
                    ))
                })?;
            warn!(
                "Visual Studio {} has no project files, using vs{}",
                version, nearest
            );
            Ok(format!("vs{}", nearest))
        }
    }
}

/// Platform token used in generated makefile directory names
pub fn make_platform(os: Os) -> &'static str {
    match os {
        Os::FreeBSD => "bsd",
        Os::Windows => "windows",
        Os::Linux => "unix",
        Os::Macos => "macosx",
    }
}

/// `config=` value for generated makefiles (`release`, `debug_x64`)
pub fn make_config(os: Os, arch: Arch, build_type: BuildType) -> Result<String> {
    let base = if build_type.is_debug() { "debug" } else { "release" };

    match os {
        Os::Windows => {
            let suffix = match arch {
                Arch::X86 => "x86",
                Arch::X86_64 => "x64",
                Arch::Armv8 => {
                    return Err(Error::UnsupportedPlatform(format!(
                        "no makefile configuration for arch={} on {}",
                        arch, os
                    )));
                }
            };
            Ok(format!("{}_{}", base, suffix))
        }
        Os::Linux | Os::Macos | Os::FreeBSD => Ok(base.to_string()),
    }
}

/// MSBuild `/p:Platform` value
///
/// Solutions for toolsets in `win32_only` ship only Win32 targets, so every
/// supported architecture maps to `Win32` there.
pub fn msbuild_platform(arch: Arch, toolset: &str, win32_only: &[String]) -> Result<&'static str> {
    let only_win32 = win32_only.iter().any(|t| t == toolset);

    match arch {
        Arch::X86 => Ok("Win32"),
        Arch::X86_64 if only_win32 => Ok("Win32"),
        Arch::X86_64 => Ok("x64"),
        Arch::Armv8 => Err(Error::UnsupportedPlatform(format!(
            "no MSBuild platform for arch={}",
            arch
        ))),
    }
}

/// MSBuild `/p:Configuration` value
pub fn msbuild_configuration(build_type: BuildType) -> &'static str {
    match build_type {
        BuildType::Debug => "Debug",
        BuildType::Release | BuildType::RelWithDebInfo | BuildType::MinSizeRel => "Release",
    }
}

/// C/C++ optimization flags for non-MSVC compilers
pub fn optimization_flags(build_type: BuildType) -> &'static str {
    match build_type {
        BuildType::Debug => "-g -O0",
        BuildType::Release => "-O3 -DNDEBUG",
        BuildType::RelWithDebInfo => "-g -O2 -DNDEBUG",
        BuildType::MinSizeRel => "-Os -DNDEBUG",
    }
}
