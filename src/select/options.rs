// src/select/options.rs

//! Option resolution and settings validation

use crate::error::{Error, Result};
use crate::recipe::{OptionValue, Recipe};
use crate::settings::{Os, Settings};
use std::collections::BTreeMap;
use tracing::debug;

/// Raw `name=value` option overrides from profiles and the command line
pub type RawOptions = BTreeMap<String, String>;

/// Resolved option values, by name
pub type ResolvedOptions = BTreeMap<String, OptionValue>;

/// Resolve declared options against overrides and prune the ones that do
/// not apply to the target
///
/// - `fPIC` is dropped on Windows and whenever `shared` is true
/// - `lto` only exists for non-Visual-Studio compilers on Windows
/// - header-only packages drop `shared` and `fPIC`
pub fn resolve_options(
    recipe: &Recipe,
    settings: &Settings,
    overrides: &RawOptions,
) -> Result<ResolvedOptions> {
    let mut resolved: ResolvedOptions = recipe
        .options
        .iter()
        .map(|(name, decl)| (name.clone(), decl.default.clone()))
        .collect();

    for (name, raw) in overrides {
        let decl = recipe.options.get(name).ok_or_else(|| {
            Error::InvalidOptionCombination(format!(
                "{} has no option '{}'",
                recipe.name(),
                name
            ))
        })?;

        let value = decl
            .values
            .iter()
            .find(|v| v.matches_raw(raw))
            .ok_or_else(|| {
                let allowed: Vec<String> = decl.values.iter().map(|v| v.to_string()).collect();
                Error::InvalidOptionCombination(format!(
                    "{}={} is not one of [{}]",
                    name,
                    raw,
                    allowed.join(", ")
                ))
            })?;

        resolved.insert(name.clone(), value.clone());
    }

    for (name, decl) in &recipe.options {
        if !decl.values.contains(&decl.default) {
            return Err(Error::InvalidOptionCombination(format!(
                "default {}={} is not a declared value",
                name, decl.default
            )));
        }
    }

    if settings.os == Os::Windows {
        prune(&mut resolved, "fPIC", "not used on Windows");
    }

    if resolved.get("shared") == Some(&OptionValue::Bool(true)) {
        prune(&mut resolved, "fPIC", "implied by shared=true");
    }

    if settings.os != Os::Windows || settings.compiler.kind.is_msvc() {
        prune(&mut resolved, "lto", "unsupported by this compiler");
    }

    if recipe.is_header_only() {
        prune(&mut resolved, "shared", "header-only package");
        prune(&mut resolved, "fPIC", "header-only package");
    }

    Ok(resolved)
}

fn prune(options: &mut ResolvedOptions, name: &str, reason: &str) {
    if options.remove(name).is_some() {
        debug!("Dropping option {} ({})", name, reason);
    }
}

/// Ordering rank of a C++ standard (`98`, `11`, `gnu17`)
pub fn cppstd_rank(std: &str) -> Option<u32> {
    let digits = std.trim().trim_start_matches("gnu");
    let n: u32 = digits.parse().ok()?;
    match n {
        90..=99 => Some(1900 + n),
        0..=89 => Some(2000 + n),
        _ => None,
    }
}

/// Check `compiler.cppstd` against the recipe minimum
///
/// Without a pinned standard the compiler default is assumed to suffice.
pub fn check_cppstd(recipe: &Recipe, settings: &Settings) -> Result<()> {
    let (Some(min), Some(actual)) = (
        recipe.requirements.min_cppstd.as_deref(),
        settings.compiler.cppstd.as_deref(),
    ) else {
        return Ok(());
    };

    let min_rank = cppstd_rank(min)
        .ok_or_else(|| Error::Parse(format!("invalid min_cppstd '{}'", min)))?;
    let rank = cppstd_rank(actual).ok_or_else(|| {
        Error::UnsupportedPlatform(format!("compiler.cppstd={} is not recognized", actual))
    })?;

    if rank < min_rank {
        return Err(Error::UnsupportedPlatform(format!(
            "{} requires C++{} but compiler.cppstd={}",
            recipe.name(),
            min,
            actual
        )));
    }
    Ok(())
}

/// Requirements for the resolved options
pub fn resolve_requirements(recipe: &Recipe, options: &ResolvedOptions) -> Vec<String> {
    let mut requires = recipe.requirements.requires.clone();
    for (option, extra) in &recipe.requires_if {
        if options.get(option) == Some(&OptionValue::Bool(true)) {
            requires.extend(extra.iter().cloned());
        }
    }
    requires
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parse_recipe;
    use crate::settings::RawSettings;

    const LIBRARY: &str = r#"
[package]
name = "marisa"

[options.shared]
values = [true, false]
default = false

[options.fPIC]
values = [true, false]
default = true

[options.lto]
values = [true, false]
default = false

[options.flavor]
values = ["small", "fast"]
default = "fast"
"#;

    fn settings(os: &str, compiler: &str, version: &str) -> Settings {
        let mut raw = RawSettings::new();
        raw.set("os", os)
            .set("arch", "x86_64")
            .set("compiler", compiler)
            .set("compiler.version", version)
            .set("build_type", "Release");
        raw.parse().unwrap()
    }

    fn overrides(pairs: &[(&str, &str)]) -> RawOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_on_linux() {
        let recipe = parse_recipe(LIBRARY).unwrap();
        let resolved =
            resolve_options(&recipe, &settings("Linux", "gcc", "11"), &RawOptions::new()).unwrap();

        assert_eq!(resolved["shared"], OptionValue::Bool(false));
        assert_eq!(resolved["fPIC"], OptionValue::Bool(true));
        assert_eq!(resolved["flavor"], OptionValue::Text("fast".to_string()));
        assert!(!resolved.contains_key("lto"));
    }

    #[test]
    fn test_shared_drops_fpic() {
        let recipe = parse_recipe(LIBRARY).unwrap();
        let resolved = resolve_options(
            &recipe,
            &settings("Linux", "gcc", "11"),
            &overrides(&[("shared", "True"), ("fPIC", "true")]),
        )
        .unwrap();

        assert_eq!(resolved["shared"], OptionValue::Bool(true));
        assert!(!resolved.contains_key("fPIC"));
    }

    #[test]
    fn test_windows_options() {
        let recipe = parse_recipe(LIBRARY).unwrap();

        let msvc = resolve_options(
            &recipe,
            &settings("Windows", "Visual Studio", "16"),
            &RawOptions::new(),
        )
        .unwrap();
        assert!(!msvc.contains_key("fPIC"));
        assert!(!msvc.contains_key("lto"));

        let mingw =
            resolve_options(&recipe, &settings("Windows", "gcc", "11"), &RawOptions::new())
                .unwrap();
        assert_eq!(mingw["lto"], OptionValue::Bool(false));
    }

    #[test]
    fn test_unknown_option_and_value() {
        let recipe = parse_recipe(LIBRARY).unwrap();
        let linux = settings("Linux", "gcc", "11");

        assert!(matches!(
            resolve_options(&recipe, &linux, &overrides(&[("with_zlib", "true")])),
            Err(Error::InvalidOptionCombination(_))
        ));
        assert!(matches!(
            resolve_options(&recipe, &linux, &overrides(&[("flavor", "huge")])),
            Err(Error::InvalidOptionCombination(_))
        ));
    }

    #[test]
    fn test_cppstd_rank() {
        assert!(cppstd_rank("98") < cppstd_rank("11"));
        assert!(cppstd_rank("11") < cppstd_rank("gnu17"));
        assert_eq!(cppstd_rank("latest"), None);
    }

    #[test]
    fn test_check_cppstd() {
        let recipe = parse_recipe(
            r#"
[package]
name = "amgcl"
kind = "header-only"

[requirements]
min_cppstd = "11"
"#,
        )
        .unwrap();

        let mut s = settings("Linux", "gcc", "11");
        assert!(check_cppstd(&recipe, &s).is_ok());

        s.compiler.cppstd = Some("98".to_string());
        assert!(matches!(
            check_cppstd(&recipe, &s),
            Err(Error::UnsupportedPlatform(_))
        ));

        s.compiler.cppstd = Some("gnu14".to_string());
        assert!(check_cppstd(&recipe, &s).is_ok());
    }

    #[test]
    fn test_conditional_requirements() {
        let recipe = parse_recipe(
            r#"
[package]
name = "amgcl"

[options.with_eigen]
values = [true, false]
default = false

[requirements]
requires = ["boost/1.76.0"]

[requires_if]
with_eigen = ["eigen/3.3.9"]
"#,
        )
        .unwrap();
        let linux = settings("Linux", "gcc", "11");

        let off = resolve_options(&recipe, &linux, &RawOptions::new()).unwrap();
        assert_eq!(resolve_requirements(&recipe, &off), vec!["boost/1.76.0"]);

        let on = resolve_options(&recipe, &linux, &overrides(&[("with_eigen", "true")])).unwrap();
        assert_eq!(
            resolve_requirements(&recipe, &on),
            vec!["boost/1.76.0", "eigen/3.3.9"]
        );
    }
}
