// src/lib.rs

//! Pantry: recipe-driven native package builds
//!
//! Pantry turns a declarative recipe into an installed package folder for
//! one configuration (operating system, architecture, compiler, build type
//! and options). It fetches pinned sources, selects the build system and
//! its parameters, drives exactly one external tool and installs the result
//! into a fixed layout (`licenses/`, `include/`, `lib/`, `bin/`).
//!
//! # Architecture
//!
//! - Select: pure configuration resolution ([`select`])
//! - Kitchen: acquisition, build and install ([`recipe::Kitchen`])
//! - Batch: many recipes, many configurations, in parallel ([`batch`])

pub mod batch;
mod error;
pub mod hash;
pub mod recipe;
pub mod select;
pub mod settings;
pub mod version;

pub use error::{Error, Result, Stage};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use recipe::{CancelToken, CookResult, Kitchen, KitchenConfig, Profile, Recipe};
pub use select::{ResolvedConfiguration, Toolchain, ToolsetPolicy, select};
pub use settings::{RawSettings, Settings};
pub use version::{RecipeVersion, VersionConstraint};
