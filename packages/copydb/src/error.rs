//! Typed errors for the copydb library.
//!
//! Uses `thiserror` for library errors (not `anyhow`); the `copydb` binary
//! wraps these with context at the command boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while dumping, filtering or restoring a schema.
#[derive(Debug, Error)]
pub enum CopyError {
    /// A restore or listing was attempted against a dump file that is not on disk
    #[error("file \"{}\" does not exist", path.display())]
    MissingArtifact { path: PathBuf },

    /// The dump file exists but its dump never recorded completion
    #[error("file \"{}\" was not completely dumped, dump it again", path.display())]
    IncompleteArtifact { path: PathBuf },

    /// An external tool ran and exited unsuccessfully
    #[error("{tool} exited with code {code:?}: {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// An external tool could not be started or waited for
    #[error("failed to run {tool}: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// An external tool binary could not be located
    #[error("{tool} not found (set PGCOPYDB_PG_BINDIR or add it to PATH)")]
    ToolNotFound { tool: String },

    /// The archive listing contained a line we could not read
    #[error("failed to parse archive listing line: {line:?}")]
    InvalidListing { line: String },

    /// The operation succeeded but its completion marker could not be recorded
    #[error("failed to write the tracking file \"{}\": {source}", path.display())]
    MarkerWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The filtered manifest could not be assembled in memory
    #[error("failed to create pg_restore list file: {0}")]
    ManifestBuild(String),

    /// The filtered manifest could not be written to disk
    #[error("failed to write pg_restore list file \"{}\": {source}", path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The working directory is not usable for this run
    #[error("working directory \"{}\": {reason}", path.display())]
    Workdir { path: PathBuf, reason: String },

    /// Filesystem error outside of marker and manifest writes
    #[error("I/O error on \"{}\": {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Missing or conflicting configuration
    #[error("config error: {0}")]
    Config(String),
}

impl CopyError {
    /// True for failures reported by the dump, restore or list tools themselves.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::ToolFailed { .. }
                | Self::ToolSpawn { .. }
                | Self::ToolNotFound { .. }
                | Self::InvalidListing { .. }
        )
    }
}

/// Result type alias for copydb operations.
pub type Result<T> = std::result::Result<T, CopyError>;
