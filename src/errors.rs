//! Error taxonomy shared across probing, planning and execution.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while running or parsing an external probe utility.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to run {utility}: {source}")]
    Run {
        utility: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{utility} exited with status {status}: {stderr}")]
    Failed {
        utility: String,
        status: i32,
        stderr: String,
    },

    #[error("can't parse {utility} output near {snippet:?}")]
    Parse { utility: String, snippet: String },
}

impl ProbeError {
    pub fn parse(utility: &str, snippet: impl Into<String>) -> Self {
        ProbeError::Parse {
            utility: utility.to_string(),
            snippet: snippet.into(),
        }
    }
}

/// Failures while resolving the mount point into a storage graph.
#[derive(Error, Debug)]
pub enum GraphResolveError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("mount point {0} not found in the mount table")]
    MountNotFound(PathBuf),

    #[error("backing device {0} is not a known block device")]
    UnknownDevice(String),

    #[error("no logical volume with kernel device {major}:{minor}")]
    LvNotFound { major: u32, minor: u32 },

    #[error("volume group {0} not found")]
    VgNotFound(String),

    #[error("disk {0} is locked by another process")]
    DiskBusy(PathBuf),

    #[error("can't lock disk {disk}: {source}")]
    LockFailed {
        disk: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Unknown token in a `--filter` expression.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown filter token `{0}`")]
pub struct FilterSyntaxError(pub String);

/// Planning cannot proceed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("msdos disk {disk} already has four primary partitions")]
    PrimaryPartitionLimit { disk: PathBuf },

    #[error("free space exists but the filter admits none of it")]
    NoAdmissibleSources,

    #[error("can't grow filesystem of type {kind}")]
    UnsupportedFilesystem { kind: String },
}

/// A plan step's utility invocation failed; execution aborts.
#[derive(Error, Debug)]
#[error("step `{step}` failed: {stderr}")]
pub struct ExecError {
    pub step: String,
    pub stderr: String,
}
