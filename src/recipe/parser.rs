// src/recipe/parser.rs

//! Recipe file parsing

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::recipe::format::{BuildSystem, Recipe};
use crate::version::{RecipeVersion, VersionConstraint};
use std::path::Path;

/// Parse a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    toml::from_str(content).map_err(|e| Error::Parse(format!("Invalid recipe: {}", e)))
}

/// Parse a recipe from a file
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::NotFound(format!("Failed to read recipe {}: {}", path.display(), e))
    })?;

    parse_recipe(&content)
}

/// Validate a recipe for completeness and correctness
///
/// Hard problems are errors; soft ones come back as warnings.
pub fn validate_recipe(recipe: &Recipe) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if recipe.package.name.is_empty() {
        return Err(Error::Parse("Recipe package name cannot be empty".to_string()));
    }
    if recipe.sources.is_empty() {
        return Err(Error::Parse(format!(
            "{} declares no versions",
            recipe.package.name
        )));
    }

    for (version, entry) in &recipe.sources {
        RecipeVersion::parse(version)?;
        entry.to_source_ref().map_err(|e| {
            Error::Parse(format!("{} {}: {}", recipe.package.name, version, e))
        })?;
        if let Some(checksum) = &entry.checksum {
            Hash::parse_prefixed(checksum).map_err(|e| {
                Error::Parse(format!("Invalid checksum for {}: {}", version, e))
            })?;
        }
    }

    for version in recipe.patches.keys() {
        if !recipe.sources.contains_key(version) {
            return Err(Error::Parse(format!(
                "Patches declared for {} which has no source",
                version
            )));
        }
    }

    for (name, decl) in &recipe.options {
        if !decl.values.contains(&decl.default) {
            return Err(Error::Parse(format!(
                "Default for option {} is not one of its values",
                name
            )));
        }
    }

    for option in recipe.requires_if.keys() {
        if !recipe.options.contains_key(option) {
            return Err(Error::Parse(format!(
                "requires_if refers to undeclared option {}",
                option
            )));
        }
    }

    for rule in &recipe.layout.make_prefix {
        if let Some(when) = &rule.when {
            VersionConstraint::parse(when)?;
        }
    }
    if let Some(newest) = &recipe.layout.newest_toolset {
        VersionConstraint::parse(newest)?;
    }

    match recipe.build.system {
        BuildSystem::Make if recipe.build.make.is_none() => {
            return Err(Error::Parse("build.system = make needs [build.make]".to_string()));
        }
        BuildSystem::Msbuild if recipe.build.msbuild.is_none() => {
            return Err(Error::Parse(
                "build.system = msbuild needs [build.msbuild]".to_string(),
            ));
        }
        BuildSystem::Premake if recipe.build.make.is_none() || recipe.build.msbuild.is_none() => {
            return Err(Error::Parse(
                "build.system = premake needs [build.make] and [build.msbuild]".to_string(),
            ));
        }
        _ => {}
    }

    if recipe.is_header_only() && recipe.build.system != BuildSystem::None {
        warnings.push("Header-only package has a build system; it will not be run".to_string());
    }

    if recipe.package.description.is_none() {
        warnings.push("Missing package description".to_string());
    }
    if recipe.package.license.is_none() {
        warnings.push("Missing package license".to_string());
    }
    if !recipe.install.copy.iter().any(|c| c.dst == "licenses") {
        warnings.push("No install rule copies into licenses".to_string());
    }

    for patches in recipe.patches.values() {
        for patch in patches {
            if patch.is_remote() && patch.checksum.is_none() {
                warnings.push(format!("Remote patch {} has no checksum", patch.file));
            }
        }
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
[package]
name = "test"
license = "MIT"
description = "A test package"

[sources."1.0"]
url = "https://example.com/test-1.0.tar.gz"
checksum = "sha256:dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"

[[install.copy]]
pattern = "LICENSE"
dst = "licenses"
"#;

    #[test]
    fn test_parse_valid_recipe() {
        let recipe = parse_recipe(VALID).unwrap();
        assert_eq!(recipe.package.name, "test");
        assert!(validate_recipe(&recipe).unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid_recipe() {
        let content = "this is not valid toml at all {}";
        assert!(matches!(parse_recipe(content), Err(Error::Parse(_))));
    }

    #[test]
    fn test_validate_empty_name() {
        let content = VALID.replace("name = \"test\"", "name = \"\"");
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_bad_checksum() {
        let content = VALID.replace("sha256:dffd", "md5:dffd");
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_no_versions() {
        let recipe = parse_recipe("[package]\nname = \"empty\"\n").unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_requires_if_unknown_option() {
        let content = format!("{}\n[requires_if]\nwith_eigen = [\"eigen/3.3.9\"]\n", VALID);
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let content = r#"
[package]
name = "test"

[sources."1.0"]
url = "https://example.com/test.tar.gz"
checksum = "sha256:dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"

[[patches."1.0"]]
file = "https://example.com/fix.patch"
"#;

        let recipe = parse_recipe(content).unwrap();
        let warnings = validate_recipe(&recipe).unwrap();
        assert!(warnings.iter().any(|w| w.contains("description")));
        assert!(warnings.iter().any(|w| w.contains("license")));
        assert!(warnings.iter().any(|w| w.contains("licenses")));
        assert!(warnings.iter().any(|w| w.contains("fix.patch")));
    }

    #[test]
    fn test_parse_recipe_file_missing() {
        assert!(matches!(
            parse_recipe_file(Path::new("/nonexistent/recipe.toml")),
            Err(Error::NotFound(_))
        ));
    }
}
