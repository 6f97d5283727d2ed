// src/recipe/mod.rs

//! Recipe system for building native packages from source
//!
//! Recipes define how to build a package across its upstream versions:
//! - Source archives (or git revisions) and their checksums, per version
//! - Patches to apply, per version
//! - Options, requirements and version-dependent layout rules
//! - The build system to drive and how to install the result
//!
//! # Culinary Terminology
//!
//! - **Recipe**: The build description (like a recipe card)
//! - **Kitchen**: Where recipes are cooked, owns the working directories
//! - **Ingredients**: Source archives and patches
//! - **Prep**: Fetch and unpack sources
//! - **Simmer**: Run the external build tool
//! - **Plate**: Install into the package folder
//!
//! # Example Recipe
//!
//! ```toml
//! [package]
//! name = "marisa-trie"
//! license = "BSD-2-Clause"
//!
//! [sources."0.2.6"]
//! url = "https://github.com/s-yata/marisa-trie/archive/v0.2.6.tar.gz"
//! checksum = "sha256:1063a27c789e75afa2ee6f1716cc6a5486631dcfcb7f4d56d6485d2462e566de"
//!
//! [options.shared]
//! values = [true, false]
//! default = false
//!
//! [build]
//! system = "autotools"
//! autoreconf = true
//!
//! [[install.copy]]
//! pattern = "COPYING.md"
//! dst = "licenses"
//! ```

mod format;
pub mod kitchen;
pub mod parser;

pub use format::{
    BuildSection, BuildSystem, CopyRule, GatedValue, InfoSection, InstallSection, LayoutSection,
    MakeSection, MsBuildSection, OptionDecl, OptionValue, PackageKind, PackageSection, PatchInfo,
    Recipe, ReplaceRule, RequirementsSection, SourceEntry,
};
pub use kitchen::{CancelToken, CookResult, Kitchen, KitchenConfig, PantryConfig, Profile};
pub use parser::{parse_recipe, parse_recipe_file, validate_recipe};
