// src/error.rs

//! Error types for recipe selection, acquisition, build and install

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Configuration selection (pure, before any process runs)
    Select,
    /// Source acquisition
    Source,
    /// Patching and running the build tool
    Build,
    /// Installing and staging artifacts
    Package,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Source => "source",
            Self::Build => "build",
            Self::Package => "package",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Network, transport or local-file failure while fetching sources
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Downloaded content does not match the pinned checksum or revision
    #[error("Integrity check failed for {url}: expected {expected}, got {actual}")]
    Integrity {
        url: String,
        expected: String,
        actual: String,
    },

    /// Archive is malformed or of an unknown format
    #[error("Failed to unpack {archive}: {message}")]
    Unpack { archive: PathBuf, message: String },

    /// Setting value outside the supported tables
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Option values that cannot be combined or are not declared
    #[error("Invalid option combination: {0}")]
    InvalidOptionCombination(String),

    /// A patch or in-file replacement failed to apply
    #[error("Failed to apply patch {patch}: {message}")]
    Patch { patch: String, message: String },

    /// External build tool exited unsuccessfully or could not be started
    #[error("{program} failed ({status})\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    ExternalTool {
        program: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    /// External build tool ran past the configured timeout
    #[error("{program} timed out after {seconds} seconds\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    ToolTimeout {
        program: String,
        seconds: u64,
        stdout: String,
        stderr: String,
    },

    /// Expected artifacts are missing after a successful tool run
    #[error("Staging failed: {0}")]
    Staging(String),

    /// Operation interrupted through a cancel token
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Any of the above, annotated with the package and stage it came from
    #[error("{package}: {stage} stage failed: {source}")]
    Stage {
        package: String,
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Annotate this error with the package and stage it was raised in
    ///
    /// Errors that already carry a stage are returned unchanged so the
    /// innermost context wins.
    pub fn in_stage(self, package: &str, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                package: package.to_string(),
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any stage annotation removed
    pub fn root(&self) -> &Error {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stage this error was raised in, if known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether an outer orchestrator may reasonably retry the failed step
    ///
    /// Only transport failures during acquisition are considered transient.
    pub fn is_transient(&self) -> bool {
        matches!(self.root(), Self::Fetch { .. })
    }
}

impl From<walkdir::Error> for Error {
    fn from(e: walkdir::Error) -> Self {
        Self::Io(e.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
