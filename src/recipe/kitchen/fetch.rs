// src/recipe/kitchen/fetch.rs

//! Source acquisition
//!
//! [`acquire`] fetches one source (archive or git revision) into a fresh
//! working directory, verifies it against the pinned checksum or revision,
//! unpacks it and strips the wrapping top-level directory. The working
//! directory owns a [`TempDir`], so every failure and every cancellation
//! removes it again.

use super::archive::{extract_archive, move_contents, strip_root};
use super::process::{self, CancelToken, ToolCommand};
use crate::error::{Error, Result};
use crate::hash::{Hash, Hasher, hash_file};
use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Where a version's sources come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceRef {
    /// Archive pinned by checksum (`sha256:<hex>`)
    Archive { url: String, checksum: String },
    /// Git repository pinned by revision (tag, branch or commit id)
    Git { url: String, revision: String },
}

impl SourceRef {
    pub fn url(&self) -> &str {
        match self {
            Self::Archive { url, .. } | Self::Git { url, .. } => url,
        }
    }
}

/// Acquisition settings
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Parent of all working directories
    pub work_root: PathBuf,
    /// Verified archives, keyed by checksum
    pub source_cache: Option<PathBuf>,
    pub http_timeout: Duration,
    /// Limit for git invocations
    pub tool_timeout: Duration,
}

impl FetchOptions {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            source_cache: None,
            http_timeout: Duration::from_secs(300),
            tool_timeout: Duration::from_secs(1800),
        }
    }
}

/// Unpacked sources in a temporary directory
///
/// Dropping it removes everything.
#[derive(Debug)]
pub struct WorkingDir {
    dir: TempDir,
    root: PathBuf,
}

impl WorkingDir {
    /// Root of the unpacked sources
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Move the sources into `dest` and remove the temporary directory
    pub fn persist(self, dest: &Path) -> Result<PathBuf> {
        move_contents(&self.root, dest)?;
        Ok(dest.to_path_buf())
    }

    /// Keep the directory on disk and return the source root
    pub fn keep(self) -> PathBuf {
        let kept = self.dir.keep();
        debug!("Keeping working directory {}", kept.display());
        self.root
    }
}

/// Fetch, verify and unpack one source
pub fn acquire(
    source: &SourceRef,
    options: &FetchOptions,
    cancel: &CancelToken,
) -> Result<WorkingDir> {
    cancel.check()?;
    fs::create_dir_all(&options.work_root)?;

    let dir = tempfile::Builder::new()
        .prefix("pantry-src-")
        .tempdir_in(&options.work_root)?;
    let root = dir.path().join("src");

    match source {
        SourceRef::Archive { url, checksum } => {
            let download = dir.path().join("download");
            fs::create_dir_all(&download)?;

            let archive = fetch_archive(url, checksum, &download, options, cancel)?;
            cancel.check()?;

            extract_archive(&archive, &root)?;
            strip_root(&root, &archive)?;
            fs::remove_dir_all(&download)?;
        }
        SourceRef::Git { url, revision } => {
            clone_git(url, revision, &root, options, cancel)?;
        }
    }

    cancel.check()?;
    info!("Sources for {} ready in {}", source.url(), root.display());
    Ok(WorkingDir { dir, root })
}

/// Archive file name from a URL or path
pub fn url_to_filename(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("source")
        .to_string()
}

/// Download and verify a single file (such as a remote patch) into `dir`
///
/// Uses the source cache like archives do.
pub fn fetch_file(
    url: &str,
    checksum: &str,
    dir: &Path,
    options: &FetchOptions,
    cancel: &CancelToken,
) -> Result<PathBuf> {
    cancel.check()?;
    fs::create_dir_all(dir)?;
    fetch_archive(url, checksum, dir, options, cancel)
}

fn parse_checksum(url: &str, checksum: &str) -> Result<Hash> {
    Hash::parse_prefixed(checksum)
        .map_err(|e| Error::Parse(format!("Invalid checksum for {}: {}", url, e)))
}

/// Download (or reuse from cache) and verify one archive into `dir`
fn fetch_archive(
    url: &str,
    checksum: &str,
    dir: &Path,
    options: &FetchOptions,
    cancel: &CancelToken,
) -> Result<PathBuf> {
    let expected = parse_checksum(url, checksum)?;
    let dest = dir.join(url_to_filename(url));

    let Some(cache) = &options.source_cache else {
        download_verified(url, &expected, &dest, options, cancel)?;
        return Ok(dest);
    };

    fs::create_dir_all(cache)?;
    let key = expected.cache_key();
    let cached = cache.join(&key);

    // Serializes workers fetching the same archive.
    let lock = File::create(cache.join(format!("{}.lock", key)))?;
    lock.lock_exclusive()?;

    if cached.exists() {
        let actual = hash_file(expected.algorithm, &cached)?;
        if actual == expected {
            debug!("Using cached source: {}", cached.display());
            fs::copy(&cached, &dest)?;
            return Ok(dest);
        }
        warn!("Cached {} is corrupt, downloading again", cached.display());
        fs::remove_file(&cached)?;
    }

    let partial = cache.join(format!("{}.part", key));
    let result = download_verified(url, &expected, &partial, options, cancel);
    if result.is_err()
        && let Err(e) = fs::remove_file(&partial)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!("Failed to remove {}: {}", partial.display(), e);
    }
    result?;
    fs::rename(&partial, &cached)?;
    fs::copy(&cached, &dest)?;
    Ok(dest)
}

/// Download to `dest` and check the digest
fn download_verified(
    url: &str,
    expected: &Hash,
    dest: &Path,
    options: &FetchOptions,
    cancel: &CancelToken,
) -> Result<()> {
    info!("Downloading: {}", url);
    let actual = download(url, dest, expected, options, cancel)?;

    if actual != *expected {
        return Err(Error::Integrity {
            url: url.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    debug!("Verified {} ({})", url, actual);
    Ok(())
}

/// Stream a URL or local path to `dest`, hashing on the way
fn download(
    url: &str,
    dest: &Path,
    expected: &Hash,
    options: &FetchOptions,
    cancel: &CancelToken,
) -> Result<Hash> {
    let fetch_error = |message: String| Error::Fetch {
        url: url.to_string(),
        message,
    };

    let reader: Box<dyn Read> = match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            let client = reqwest::blocking::Client::builder()
                .timeout(options.http_timeout)
                .user_agent(concat!("pantry/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| fetch_error(format!("Failed to create HTTP client: {}", e)))?;
            let response = client
                .get(url)
                .send()
                .map_err(|e| fetch_error(e.to_string()))?;
            if !response.status().is_success() {
                return Err(fetch_error(format!("HTTP {}", response.status())));
            }
            Box::new(response)
        }
        Ok(parsed) if parsed.scheme() == "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| fetch_error("not a local file URL".to_string()))?;
            Box::new(File::open(&path).map_err(|e| fetch_error(e.to_string()))?)
        }
        // Single letters are Windows drive prefixes, not schemes.
        Ok(parsed) if parsed.scheme().len() > 1 => {
            return Err(fetch_error(format!(
                "unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }
        _ => Box::new(File::open(url).map_err(|e| fetch_error(e.to_string()))?),
    };

    stream_to_file(reader, dest, expected, cancel).map_err(|e| match e {
        Error::Io(io) => fetch_error(io.to_string()),
        other => other,
    })
}

fn stream_to_file(
    mut reader: Box<dyn Read>,
    dest: &Path,
    expected: &Hash,
    cancel: &CancelToken,
) -> Result<Hash> {
    let mut file = File::create(dest)?;
    let mut hasher = Hasher::new(expected.algorithm);
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];

    loop {
        cancel.check()?;
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        file.write_all(&buffer[..n])?;
    }
    file.flush()?;
    Ok(hasher.finalize())
}

fn is_commit_id(revision: &str) -> bool {
    (7..=40).contains(&revision.len()) && revision.chars().all(|c| c.is_ascii_hexdigit())
}

/// Clone `url` into `dest` and check out `revision`
fn clone_git(
    url: &str,
    revision: &str,
    dest: &Path,
    options: &FetchOptions,
    cancel: &CancelToken,
) -> Result<()> {
    let parent = dest.parent().unwrap_or(dest);
    let dest_arg = dest.to_string_lossy().to_string();

    let clone = ToolCommand::new("git", parent).args(["clone", "--quiet", url, &dest_arg]);
    process::run(&clone, cancel, options.tool_timeout).map_err(|e| match e {
        Error::ExternalTool { stderr, status, .. } => Error::Fetch {
            url: url.to_string(),
            message: format!("git clone failed ({}): {}", status, stderr.trim()),
        },
        other => other,
    })?;

    let checkout = ToolCommand::new("git", dest).args([
        "-c",
        "advice.detachedHead=false",
        "checkout",
        "--quiet",
        revision,
    ]);
    process::run(&checkout, cancel, options.tool_timeout).map_err(|e| match e {
        Error::ExternalTool { .. } => Error::Integrity {
            url: url.to_string(),
            expected: revision.to_string(),
            actual: "revision not found".to_string(),
        },
        other => other,
    })?;

    if is_commit_id(revision) {
        let head = ToolCommand::new("git", dest).args(["rev-parse", "HEAD"]);
        let output = process::run(&head, cancel, options.tool_timeout)?;
        let head = output.stdout.trim().to_ascii_lowercase();
        if !head.starts_with(&revision.to_ascii_lowercase()) {
            return Err(Error::Integrity {
                url: url.to_string(),
                expected: revision.to_string(),
                actual: head,
            });
        }
    }
    Ok(())
}
