// src/recipe/kitchen/info.rs

//! Consumer-facing package information (`package_info.json`)

use crate::error::{Error, Result};
use crate::recipe::Recipe;
use crate::select::ResolvedConfiguration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// What consumers of a package need to link against it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub package_id: String,
    pub header_only: bool,
    pub settings: BTreeMap<String, String>,
    pub options: BTreeMap<String, String>,
    pub requires: Vec<String>,
    pub libs: Vec<String>,
    pub system_libs: Vec<String>,
    pub defines: Vec<String>,
    pub include_dirs: Vec<String>,
    pub lib_dirs: Vec<String>,
    pub bin_dirs: Vec<String>,
    /// Directories consumers should add to `PATH`
    pub path_additions: Vec<PathBuf>,
    /// Names for generators (`cmake`, `pkgconfig`)
    pub names: BTreeMap<String, String>,
}

impl PackageInfo {
    pub const FILE_NAME: &'static str = "package_info.json";

    pub fn new(recipe: &Recipe, config: &ResolvedConfiguration, package_folder: &Path) -> Self {
        let info = &recipe.info;

        let settings = if config.header_only {
            BTreeMap::new()
        } else {
            recipe
                .package
                .settings
                .iter()
                .filter_map(|key| config.settings.value_of(key).map(|v| (key.clone(), v)))
                .collect()
        };

        let defines = info
            .defines
            .iter()
            .filter(|(option, _)| config.is_enabled(option))
            .flat_map(|(_, defines)| defines.iter().cloned())
            .collect();

        let system_libs = info
            .system_libs
            .get(&config.settings.os.to_string())
            .cloned()
            .unwrap_or_default();

        let (lib_dirs, bin_dirs) = if config.header_only {
            (Vec::new(), Vec::new())
        } else {
            (vec!["lib".to_string()], vec!["bin".to_string()])
        };

        let path_additions = if info.bin_path {
            vec![package_folder.join("bin")]
        } else {
            Vec::new()
        };

        Self {
            name: config.name.clone(),
            version: config.version.clone(),
            package_id: config.package_id.clone(),
            header_only: config.header_only,
            settings,
            options: config
                .options
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
            requires: config.requires.clone(),
            libs: info.libs.clone(),
            system_libs,
            defines,
            include_dirs: vec!["include".to_string()],
            lib_dirs,
            bin_dirs,
            path_additions,
            names: info.names.clone(),
        }
    }

    /// Write `package_info.json` into `dir`
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(Self::FILE_NAME);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Staging(format!("Failed to serialize package info: {}", e)))?;
        fs::write(&path, json)?;
        Ok(path)
    }

    /// Read `package_info.json` from a package folder
    pub fn read(package_folder: &Path) -> Result<Self> {
        let path = package_folder.join(Self::FILE_NAME);
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::NotFound(format!("{}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Parse(format!("Invalid {}: {}", path.display(), e)))
    }
}
