// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use pantry::hash::{HashAlgorithm, hash_bytes};
use pantry::recipe::{KitchenConfig, Profile, Recipe, parse_recipe};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// A file inside a fixture archive: path below the root, content, mode
pub type Entry<'a> = (&'a str, &'a str, u32);

/// Write a `.tar.gz` whose entries all live below `root/`
///
/// Returns the archive path and its `sha256:` checksum.
pub fn write_source_archive(dir: &Path, root: &str, entries: &[Entry]) -> (PathBuf, String) {
    let path = dir.join(format!("{}.tar.gz", root));
    let file = File::create(&path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, content, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", root, name), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();

    let checksum =
        hash_bytes(HashAlgorithm::Sha256, &fs::read(&path).unwrap()).to_prefixed_string();
    (path, checksum)
}

/// Write `recipe.toml` into `dir` and parse it
pub fn write_recipe(dir: &Path, content: &str) -> Recipe {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("recipe.toml"), content).unwrap();
    parse_recipe(content).unwrap()
}

/// Linux/gcc 11/x86_64 release profile
pub fn linux_profile() -> Profile {
    let mut profile = Profile::default();
    profile.set_setting("os", "Linux");
    profile.set_setting("arch", "x86_64");
    profile.set_setting("compiler", "gcc");
    profile.set_setting("compiler.version", "11");
    profile.set_setting("build_type", "Release");
    profile
}

/// Kitchen configuration confined to `dir`
pub fn isolated_config(dir: &Path) -> KitchenConfig {
    let mut config = KitchenConfig::isolated(dir);
    config.jobs = 1;
    config
}

/// Whether every tool is on PATH
pub fn have_tools(tools: &[&str]) -> bool {
    tools.iter().all(|tool| which::which(tool).is_ok())
}

/// Entries left in a kitchen work root
pub fn leftover_work_dirs(work_root: &Path) -> Vec<PathBuf> {
    match fs::read_dir(work_root) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}
