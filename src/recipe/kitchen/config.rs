// src/recipe/kitchen/config.rs

//! Configuration types for the Kitchen

use super::fetch::FetchOptions;
use super::info::PackageInfo;
use crate::error::{Error, Result};
use crate::recipe::OptionValue;
use crate::select::{RawOptions, ToolsetPolicy};
use crate::settings::RawSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Configuration for the Kitchen
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// Parent directory for temporary working directories
    pub work_root: PathBuf,
    /// Directory for verified source archives (`None` disables caching)
    pub source_cache: Option<PathBuf>,
    /// Timeout for each external tool invocation
    pub timeout: Duration,
    /// Number of parallel jobs passed to make
    pub jobs: u32,
    /// Keep build directory after completion (for debugging)
    pub keep_builddir: bool,
    /// Fallback for Visual Studio versions without project files
    pub toolset_policy: ToolsetPolicy,
    /// Keep libtool `.la` files in `lib/`
    pub keep_libtool_files: bool,
    /// Timeout for a single source download
    pub http_timeout: Duration,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);

        Self {
            work_root: std::env::temp_dir().join("pantry"),
            source_cache: dirs::cache_dir().map(|d| d.join("pantry").join("sources")),
            timeout: Duration::from_secs(3600), // 1 hour
            jobs,
            keep_builddir: false,
            toolset_policy: ToolsetPolicy::Nearest,
            keep_libtool_files: false,
            http_timeout: Duration::from_secs(300),
        }
    }
}

impl KitchenConfig {
    /// Configuration rooted in `dir`, without a shared source cache
    ///
    /// Used by batch workers and tests that must not touch the user's cache.
    pub fn isolated(dir: &Path) -> Self {
        Self {
            work_root: dir.join("work"),
            source_cache: None,
            ..Self::default()
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            work_root: self.work_root.clone(),
            source_cache: self.source_cache.clone(),
            http_timeout: self.http_timeout,
            tool_timeout: self.timeout,
        }
    }
}

/// `[kitchen]` section of the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KitchenOverrides {
    pub work_root: Option<PathBuf>,
    pub source_cache: Option<PathBuf>,
    /// Disable the source cache entirely
    #[serde(default)]
    pub no_source_cache: bool,
    pub timeout_secs: Option<u64>,
    pub jobs: Option<u32>,
    pub keep_builddir: Option<bool>,
    pub toolset_policy: Option<ToolsetPolicy>,
    pub keep_libtool_files: Option<bool>,
    pub http_timeout_secs: Option<u64>,
}

impl KitchenOverrides {
    pub fn apply(&self, config: &mut KitchenConfig) {
        if let Some(dir) = &self.work_root {
            config.work_root = dir.clone();
        }
        if let Some(dir) = &self.source_cache {
            config.source_cache = Some(dir.clone());
        }
        if self.no_source_cache {
            config.source_cache = None;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs.max(1);
        }
        if let Some(keep) = self.keep_builddir {
            config.keep_builddir = keep;
        }
        if let Some(policy) = self.toolset_policy {
            config.toolset_policy = policy;
        }
        if let Some(keep) = self.keep_libtool_files {
            config.keep_libtool_files = keep;
        }
        if let Some(secs) = self.http_timeout_secs {
            config.http_timeout = Duration::from_secs(secs);
        }
    }
}

/// Contents of `~/.config/pantry/config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PantryConfig {
    #[serde(default)]
    pub kitchen: KitchenOverrides,
}

impl PantryConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("pantry").join("config.toml"))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Parse(format!("Invalid config: {}", e)))
    }

    /// Load an explicit config file, or the default one if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::NotFound(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn kitchen_config(&self) -> KitchenConfig {
        let mut config = KitchenConfig::default();
        self.kitchen.apply(&mut config);
        config
    }
}

/// Settings, options and environment for one build
///
/// ```toml
/// [settings]
/// os = "Linux"
/// arch = "x86_64"
/// compiler = "gcc"
/// "compiler.version" = "11"
/// build_type = "Release"
///
/// [options]
/// shared = true
///
/// [env]
/// CFLAGS = "-pipe"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub settings: RawSettings,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Profile {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Parse(format!("Invalid profile: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::NotFound(format!("Failed to read profile {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn set_setting(&mut self, key: &str, value: &str) {
        self.settings.set(key, value);
    }

    pub fn set_option(&mut self, key: &str, value: &str) {
        self.options
            .insert(key.to_string(), OptionValue::Text(value.to_string()));
    }

    /// Settings with unset keys filled in from the host
    pub fn resolved_settings(&self) -> RawSettings {
        let mut settings = self.settings.clone();
        let mut host = RawSettings::host();

        // An explicit compiler never inherits the host compiler's subsettings.
        if settings.get("compiler").is_some() {
            host.0.retain(|k, _| !k.starts_with("compiler"));
        }
        settings.merge_defaults(&host);
        settings
    }

    pub fn raw_options(&self) -> RawOptions {
        self.options
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

/// Result of cooking a recipe
#[derive(Debug)]
pub struct CookResult {
    /// Published package folder
    pub package_folder: PathBuf,
    pub package_id: String,
    pub info: PackageInfo,
    /// Build log
    pub log: String,
    /// Build directory, when kept for debugging
    pub kept_builddir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kitchen_config_default() {
        let config = KitchenConfig::default();
        assert!(config.jobs > 0);
        assert!(!config.keep_builddir);
        assert!(!config.keep_libtool_files);
        assert_eq!(config.toolset_policy, ToolsetPolicy::Nearest);
    }

    #[test]
    fn test_config_file_overrides() {
        let config = PantryConfig::parse(
            r#"
[kitchen]
work_root = "/tmp/pantry-work"
no_source_cache = true
timeout_secs = 60
jobs = 0
toolset_policy = "strict"
"#,
        )
        .unwrap()
        .kitchen_config();

        assert_eq!(config.work_root, PathBuf::from("/tmp/pantry-work"));
        assert_eq!(config.source_cache, None);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.jobs, 1);
        assert_eq!(config.toolset_policy, ToolsetPolicy::Strict);
    }

    #[test]
    fn test_config_rejects_unknown_keys() {
        assert!(PantryConfig::parse("[kitchen]\nallow_network = true\n").is_err());
    }

    #[test]
    fn test_profile_parse() {
        let profile = Profile::parse(
            r#"
[settings]
os = "Linux"
compiler = "gcc"
"compiler.version" = "11"

[options]
shared = true
flavor = "fast"

[env]
CFLAGS = "-pipe"
"#,
        )
        .unwrap();

        assert_eq!(profile.settings.get("compiler.version"), Some("11"));
        let options = profile.raw_options();
        assert_eq!(options["shared"], "true");
        assert_eq!(options["flavor"], "fast");
        assert_eq!(profile.env["CFLAGS"], "-pipe");
    }

    #[test]
    fn test_resolved_settings_keeps_explicit_compiler() {
        let mut profile = Profile::default();
        profile.set_setting("compiler", "clang");
        let settings = profile.resolved_settings();

        assert_eq!(settings.get("compiler"), Some("clang"));
        assert_eq!(settings.get("compiler.version"), None);
        assert!(settings.get("build_type").is_some());
    }

    #[test]
    fn test_command_line_option_overrides() {
        let mut profile = Profile::parse("[options]\nshared = false\n").unwrap();
        profile.set_option("shared", "True");
        assert_eq!(profile.raw_options()["shared"], "True");
    }
}
