// src/settings/mod.rs

//! Target platform settings
//!
//! Settings describe the machine and toolchain a package is built for:
//! operating system, architecture, compiler and build type. They arrive as
//! loose `key=value` strings from profiles and the command line
//! ([`RawSettings`]) and are parsed once, at the selector boundary, into
//! the closed enumerations below. Anything outside these enumerations is an
//! [`Error::UnsupportedPlatform`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Operating systems a recipe can target
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
    AsRefStr, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Os {
    Windows,
    Linux,
    Macos,
    FreeBSD,
}

impl Os {
    /// Operating system of the running host, if supported
    pub fn host() -> Option<Self> {
        match std::env::consts::OS {
            "windows" => Some(Self::Windows),
            "linux" => Some(Self::Linux),
            "macos" => Some(Self::Macos),
            "freebsd" => Some(Self::FreeBSD),
            _ => None,
        }
    }
}

/// CPU architectures
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
    AsRefStr, Serialize, Deserialize,
)]
pub enum Arch {
    #[strum(serialize = "x86")]
    #[serde(rename = "x86")]
    X86,
    #[strum(serialize = "x86_64")]
    #[serde(rename = "x86_64")]
    X86_64,
    #[strum(serialize = "armv8")]
    #[serde(rename = "armv8")]
    Armv8,
}

impl Arch {
    /// Architecture of the running host, if supported
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86" => Some(Self::X86),
            "x86_64" => Some(Self::X86_64),
            "aarch64" => Some(Self::Armv8),
            _ => None,
        }
    }
}

/// Compiler families
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
    AsRefStr, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum CompilerKind {
    #[strum(serialize = "gcc")]
    #[serde(rename = "gcc")]
    Gcc,
    #[strum(serialize = "clang")]
    #[serde(rename = "clang")]
    Clang,
    #[strum(serialize = "apple-clang")]
    #[serde(rename = "apple-clang")]
    AppleClang,
    #[strum(to_string = "Visual Studio", serialize = "msvc")]
    #[serde(rename = "Visual Studio")]
    VisualStudio,
}

impl CompilerKind {
    pub fn is_msvc(&self) -> bool {
        matches!(self, Self::VisualStudio)
    }
}

/// MSVC runtime library flavor (`-MD`, `-MT`, ...)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
    AsRefStr, Serialize, Deserialize,
)]
pub enum Runtime {
    MD,
    MT,
    MDd,
    MTd,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
    AsRefStr, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum BuildType {
    Debug,
    Release,
    RelWithDebInfo,
    MinSizeRel,
}

impl BuildType {
    pub fn is_debug(&self) -> bool {
        matches!(self, Self::Debug)
    }
}

/// Compiler identity and version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Compiler {
    pub kind: CompilerKind,
    /// Version as written in the profile (`"16"`, `"11.2"`)
    pub version: String,
    /// MSVC runtime; `None` for other compilers
    pub runtime: Option<Runtime>,
    /// C++ standard (`"11"`, `"gnu17"`), if pinned
    pub cppstd: Option<String>,
}

impl Compiler {
    /// Major version number, if the version string starts with one
    pub fn major_version(&self) -> Option<u32> {
        self.version
            .split('.')
            .next()
            .and_then(|major| major.trim().parse().ok())
    }

    /// Default compiler for an operating system
    pub fn default_for(os: Os) -> Self {
        match os {
            Os::Windows => Self {
                kind: CompilerKind::VisualStudio,
                version: "16".to_string(),
                runtime: Some(Runtime::MD),
                cppstd: None,
            },
            Os::Macos => Self {
                kind: CompilerKind::AppleClang,
                version: "14".to_string(),
                runtime: None,
                cppstd: None,
            },
            Os::Linux | Os::FreeBSD => Self {
                kind: CompilerKind::Gcc,
                version: "11".to_string(),
                runtime: None,
                cppstd: None,
            },
        }
    }
}

/// Fully typed settings for one build
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Settings {
    pub os: Os,
    pub arch: Arch,
    pub compiler: Compiler,
    pub build_type: BuildType,
    /// Build machine, when it differs from the target
    pub os_build: Option<Os>,
    pub arch_build: Option<Arch>,
}

impl Settings {
    /// Whether the build machine differs from the target
    ///
    /// An x86_64 build machine producing x86 binaries for the same OS is
    /// not counted as cross-building.
    pub fn is_cross_building(&self) -> bool {
        let os_build = self.os_build.unwrap_or(self.os);
        let arch_build = self.arch_build.unwrap_or(self.arch);

        if os_build != self.os {
            return true;
        }
        match (arch_build, self.arch) {
            (a, b) if a == b => false,
            (Arch::X86_64, Arch::X86) => false,
            _ => true,
        }
    }

    /// Value of a setting by its profile key, used for package ids
    pub fn value_of(&self, key: &str) -> Option<String> {
        match key {
            "os" => Some(self.os.to_string()),
            "arch" => Some(self.arch.to_string()),
            "compiler" => Some(format!(
                "{} {}{}",
                self.compiler.kind,
                self.compiler.version,
                self.compiler
                    .runtime
                    .map(|r| format!(" {}", r))
                    .unwrap_or_default()
            )),
            "build_type" => Some(self.build_type.to_string()),
            _ => None,
        }
    }
}

/// Settings as loose strings, keyed like `os`, `compiler.version`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSettings(pub BTreeMap<String, String>);

impl RawSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    /// Fill unset keys from `other`
    pub fn merge_defaults(&mut self, other: &RawSettings) {
        for (key, value) in &other.0 {
            self.0.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Settings describing the running host with its default compiler
    pub fn host() -> Self {
        let mut raw = Self::new();
        if let Some(os) = Os::host() {
            let compiler = Compiler::default_for(os);
            raw.set("os", os.to_string());
            raw.set("compiler", compiler.kind.to_string());
            raw.set("compiler.version", compiler.version);
            if let Some(runtime) = compiler.runtime {
                raw.set("compiler.runtime", runtime.to_string());
            }
        }
        if let Some(arch) = Arch::host() {
            raw.set("arch", arch.to_string());
        }
        raw.set("build_type", BuildType::Release.to_string());
        raw
    }

    /// Parse into typed settings
    pub fn parse(&self) -> Result<Settings> {
        let os: Os = self.parse_required("os")?;
        let arch: Arch = self.parse_required("arch")?;
        let kind: CompilerKind = self.parse_required("compiler")?;
        let build_type: BuildType = self.parse_required("build_type")?;

        let version = self
            .get("compiler.version")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::UnsupportedPlatform("setting 'compiler.version' is not set".to_string())
            })?;

        let runtime = match self.get("compiler.runtime") {
            Some(value) if kind.is_msvc() => Some(parse_value::<Runtime>("compiler.runtime", value)?),
            Some(value) => {
                return Err(Error::UnsupportedPlatform(format!(
                    "compiler.runtime={} only applies to Visual Studio, not {}",
                    value, kind
                )));
            }
            None if kind.is_msvc() => Some(if build_type.is_debug() {
                Runtime::MDd
            } else {
                Runtime::MD
            }),
            None => None,
        };

        let os_build = self
            .get("os_build")
            .map(|v| parse_value::<Os>("os_build", v))
            .transpose()?;
        let arch_build = self
            .get("arch_build")
            .map(|v| parse_value::<Arch>("arch_build", v))
            .transpose()?;

        Ok(Settings {
            os,
            arch,
            compiler: Compiler {
                kind,
                version,
                runtime,
                cppstd: self.get("compiler.cppstd").map(|s| s.to_string()),
            },
            build_type,
            os_build,
            arch_build,
        })
    }

    fn parse_required<T: FromStr>(&self, key: &str) -> Result<T> {
        let value = self
            .get(key)
            .ok_or_else(|| Error::UnsupportedPlatform(format!("setting '{}' is not set", key)))?;
        parse_value(key, value)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| Error::UnsupportedPlatform(format!("{}={} is not supported", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_gcc() -> RawSettings {
        let mut raw = RawSettings::new();
        raw.set("os", "Linux")
            .set("arch", "x86_64")
            .set("compiler", "gcc")
            .set("compiler.version", "11")
            .set("build_type", "Release");
        raw
    }

    #[test]
    fn test_parse_linux_gcc() {
        let settings = linux_gcc().parse().unwrap();
        assert_eq!(settings.os, Os::Linux);
        assert_eq!(settings.arch, Arch::X86_64);
        assert_eq!(settings.compiler.kind, CompilerKind::Gcc);
        assert_eq!(settings.compiler.runtime, None);
        assert!(!settings.is_cross_building());
    }

    #[test]
    fn test_unknown_os_is_unsupported() {
        let mut raw = linux_gcc();
        raw.set("os", "Haiku");
        assert!(matches!(raw.parse(), Err(Error::UnsupportedPlatform(_))));
    }

    #[test]
    fn test_missing_setting_is_reported() {
        let mut raw = linux_gcc();
        raw.0.remove("arch");
        let err = raw.parse().unwrap_err();
        assert!(err.to_string().contains("arch"));
    }

    #[test]
    fn test_visual_studio_aliases_and_runtime_default() {
        let mut raw = linux_gcc();
        raw.set("os", "windows")
            .set("compiler", "msvc")
            .set("compiler.version", "16")
            .set("build_type", "Debug");
        let settings = raw.parse().unwrap();
        assert_eq!(settings.os, Os::Windows);
        assert_eq!(settings.compiler.kind, CompilerKind::VisualStudio);
        assert_eq!(settings.compiler.runtime, Some(Runtime::MDd));
        assert_eq!(settings.compiler.kind.to_string(), "Visual Studio");
    }

    #[test]
    fn test_runtime_rejected_for_gcc() {
        let mut raw = linux_gcc();
        raw.set("compiler.runtime", "MT");
        assert!(matches!(raw.parse(), Err(Error::UnsupportedPlatform(_))));
    }

    #[test]
    fn test_cross_building_skips_x64_to_x86() {
        let mut raw = linux_gcc();
        raw.set("arch", "x86").set("arch_build", "x86_64");
        assert!(!raw.parse().unwrap().is_cross_building());

        let mut raw = linux_gcc();
        raw.set("arch", "armv8").set("arch_build", "x86_64");
        assert!(raw.parse().unwrap().is_cross_building());

        let mut raw = linux_gcc();
        raw.set("os_build", "Windows");
        assert!(raw.parse().unwrap().is_cross_building());
    }

    #[test]
    fn test_merge_defaults_keeps_explicit_values() {
        let mut raw = RawSettings::new();
        raw.set("build_type", "Debug");
        raw.merge_defaults(&linux_gcc());
        assert_eq!(raw.get("build_type"), Some("Debug"));
        assert_eq!(raw.get("os"), Some("Linux"));
    }

    #[test]
    fn test_major_version() {
        let mut compiler = Compiler::default_for(Os::Linux);
        compiler.version = "11.2".to_string();
        assert_eq!(compiler.major_version(), Some(11));
        compiler.version = "latest".to_string();
        assert_eq!(compiler.major_version(), None);
    }
}
