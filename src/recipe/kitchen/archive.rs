// src/recipe/kitchen/archive.rs

//! Archive and source file utilities for the Kitchen

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Compression wrapped around a tarball
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Zstd,
}

/// Archive container formats the kitchen can unpack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar(Compression),
    Zip,
}

impl ArchiveFormat {
    /// Detect the format from a file name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::Tar(Compression::Gzip))
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::Tar(Compression::Xz))
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Some(Self::Tar(Compression::Zstd))
        } else if name.ends_with(".tar") {
            Some(Self::Tar(Compression::None))
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Detect the format from the leading bytes of a file
    ///
    /// Magic bytes:
    /// - Zip: `50 4b 03 04`
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    /// - Tar: `ustar` at offset 257
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x50, 0x4b, 0x03, 0x04]) {
            Some(Self::Zip)
        } else if data.starts_with(&[0x1f, 0x8b]) {
            Some(Self::Tar(Compression::Gzip))
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Some(Self::Tar(Compression::Xz))
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Some(Self::Tar(Compression::Zstd))
        } else if data.len() >= 262 && &data[257..262] == b"ustar" {
            Some(Self::Tar(Compression::None))
        } else {
            None
        }
    }

    /// Detect by name, falling back to content sniffing
    pub fn detect(archive: &Path) -> Result<Self> {
        if let Some(format) = archive
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_name)
        {
            return Ok(format);
        }

        let mut head = Vec::with_capacity(512);
        File::open(archive)?.take(512).read_to_end(&mut head)?;
        Self::from_magic_bytes(&head).ok_or_else(|| Error::Unpack {
            archive: archive.to_path_buf(),
            message: "unknown archive format".to_string(),
        })
    }
}

fn unpack_error(archive: &Path, e: impl std::fmt::Display) -> Error {
    Error::Unpack {
        archive: archive.to_path_buf(),
        message: e.to_string(),
    }
}

/// Extract an archive into `dest`
///
/// Supports: .tar.gz, .tgz, .tar.xz, .txz, .tar.zst, .tar, .zip. Entries
/// that would land outside `dest` are rejected.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let format = ArchiveFormat::detect(archive)?;
    debug!("Extracting {} ({:?})", archive.display(), format);
    fs::create_dir_all(dest)?;

    match format {
        ArchiveFormat::Tar(compression) => extract_tar(archive, compression, dest),
        ArchiveFormat::Zip => extract_zip(archive, dest),
    }
}

fn extract_tar(archive: &Path, compression: Compression, dest: &Path) -> Result<()> {
    let file = BufReader::new(File::open(archive)?);
    let reader: Box<dyn Read> = match compression {
        Compression::None => Box::new(file),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(file)),
        Compression::Zstd => {
            Box::new(zstd::Decoder::new(file).map_err(|e| unpack_error(archive, e))?)
        }
    };

    let mut tar = tar::Archive::new(reader);
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    let entries = tar.entries().map_err(|e| unpack_error(archive, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| unpack_error(archive, e))?;
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| unpack_error(archive, e))?;
        if !unpacked {
            let path = entry
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(unpack_error(
                archive,
                format!("entry {} escapes the extraction directory", path),
            ));
        }
    }
    Ok(())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| unpack_error(archive, e))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| unpack_error(archive, e))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(unpack_error(
                archive,
                format!("entry {} escapes the extraction directory", entry.name()),
            ));
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out).map_err(|e| unpack_error(archive, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
    }
    Ok(())
}

/// Lift the contents of a single top-level directory into `dir`
pub fn strip_root(dir: &Path, archive: &Path) -> Result<()> {
    let entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<_>>()?;

    let [root] = entries.as_slice() else {
        return Err(unpack_error(
            archive,
            format!(
                "expected a single top-level directory, found {} entries",
                entries.len()
            ),
        ));
    };
    if !root.is_dir() {
        return Err(unpack_error(archive, "archive root is a single file"));
    }

    // The wrapper may contain an entry with its own name, so move it aside first.
    let staging = dir.join(".pantry-strip-root");
    fs::rename(root, &staging)?;
    for entry in fs::read_dir(&staging)? {
        let entry = entry?;
        fs::rename(entry.path(), dir.join(entry.file_name()))?;
    }
    fs::remove_dir(&staging)?;
    Ok(())
}

/// Recursively copy `src` into `dst`, returning the number of files copied
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    let mut copied = 0;
    fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Io(io::Error::other(e)))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &target)?;
            copied += 1;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = fs::read_link(src)?;
    if dst.symlink_metadata().is_ok() {
        fs::remove_file(dst)?;
    }
    std::os::unix::fs::symlink(link, dst)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)?;
    Ok(())
}

/// Move the contents of `src` into `dst`, copying across filesystems
pub fn move_contents(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if fs::rename(entry.path(), &target).is_err() {
            if entry.file_type()?.is_dir() {
                copy_tree(&entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(
            ArchiveFormat::from_name("v0.2.6.tar.gz"),
            Some(ArchiveFormat::Tar(Compression::Gzip))
        );
        assert_eq!(
            ArchiveFormat::from_name("boost_1_76_0.TAR.XZ"),
            Some(ArchiveFormat::Tar(Compression::Xz))
        );
        assert_eq!(ArchiveFormat::from_name("premake.zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_name("README"), None);
    }

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            ArchiveFormat::from_magic_bytes(&[0x1f, 0x8b, 0x08]),
            Some(ArchiveFormat::Tar(Compression::Gzip))
        );
        assert_eq!(
            ArchiveFormat::from_magic_bytes(b"PK\x03\x04rest"),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(ArchiveFormat::from_magic_bytes(b"plain text"), None);
    }

    #[test]
    fn test_extract_and_strip_root() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("pkg-1.0.tar.gz");
        write_tar_gz(
            &archive,
            &[("pkg-1.0/README", "hello"), ("pkg-1.0/src/lib.c", "int x;")],
        );

        let dest = tmp.path().join("src");
        extract_archive(&archive, &dest).unwrap();
        strip_root(&dest, &archive).unwrap();

        assert_eq!(fs::read_to_string(dest.join("README")).unwrap(), "hello");
        assert!(dest.join("src/lib.c").is_file());
        assert!(!dest.join("pkg-1.0").exists());
    }

    #[test]
    fn test_strip_root_requires_single_directory() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a"), "").unwrap();
        fs::write(tmp.path().join("b"), "").unwrap();
        assert!(matches!(
            strip_root(tmp.path(), Path::new("x.tar")),
            Err(Error::Unpack { .. })
        ));
    }

    #[test]
    fn test_strip_root_with_same_named_child() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("pkg/pkg")).unwrap();
        fs::write(tmp.path().join("pkg/pkg/inner.h"), "").unwrap();

        strip_root(tmp.path(), Path::new("pkg.tar")).unwrap();
        assert!(tmp.path().join("pkg/inner.h").is_file());
    }

    #[test]
    fn test_garbage_archive_is_unpack_error() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("broken.tar.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();
        assert!(matches!(
            extract_archive(&archive, &tmp.path().join("out")),
            Err(Error::Unpack { .. })
        ));

        let unknown = tmp.path().join("mystery.bin");
        fs::write(&unknown, b"????").unwrap();
        assert!(matches!(
            extract_archive(&unknown, &tmp.path().join("out2")),
            Err(Error::Unpack { .. })
        ));
    }

    #[test]
    fn test_copy_tree() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("one"), "1").unwrap();
        fs::write(src.join("nested/two"), "2").unwrap();

        let copied = copy_tree(&src, &tmp.path().join("b")).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(
            fs::read_to_string(tmp.path().join("b/nested/two")).unwrap(),
            "2"
        );
    }
}
