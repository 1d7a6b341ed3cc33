//! Migration context: the per-run configuration every component reads.

use crate::error::{CopyError, Result};
use crate::layout::WorkdirLayout;

/// pg_restore switches applied to both restore phases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Drop objects before recreating them (`--clean --if-exists`)
    pub drop_if_exists: bool,
    pub no_owner: bool,
    pub no_acl: bool,
    pub no_comments: bool,
    pub no_tablespaces: bool,
}

impl RestoreOptions {
    /// Command line switches for pg_restore.
    pub fn to_args(&self) -> Vec<&'static str> {
        let mut args = Vec::new();
        if self.drop_if_exists {
            args.extend(["--clean", "--if-exists"]);
        }
        if self.no_owner {
            args.push("--no-owner");
        }
        if self.no_acl {
            args.push("--no-acl");
        }
        if self.no_comments {
            args.push("--no-comments");
        }
        if self.no_tablespaces {
            args.push("--no-tablespaces");
        }
        args
    }
}

/// Resolved once per run, then shared read-only.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    pub source_uri: Option<String>,
    pub target_uri: Option<String>,
    /// Exported snapshot every dump reads from, when the run is consistent
    pub snapshot: Option<String>,
    pub layout: WorkdirLayout,
    pub restore_options: RestoreOptions,
}

impl MigrationContext {
    pub fn new(layout: WorkdirLayout) -> Self {
        Self {
            source_uri: None,
            target_uri: None,
            snapshot: None,
            layout,
            restore_options: RestoreOptions::default(),
        }
    }

    pub fn with_source(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    pub fn with_target(mut self, uri: impl Into<String>) -> Self {
        self.target_uri = Some(uri.into());
        self
    }

    pub fn with_snapshot(mut self, snapshot: Option<String>) -> Self {
        self.snapshot = snapshot.filter(|s| !s.is_empty());
        self
    }

    pub fn with_restore_options(mut self, options: RestoreOptions) -> Self {
        self.restore_options = options;
        self
    }

    pub fn source(&self) -> Result<&str> {
        self.source_uri
            .as_deref()
            .ok_or_else(|| CopyError::Config("option --source is mandatory".to_string()))
    }

    pub fn target(&self) -> Result<&str> {
        self.target_uri
            .as_deref()
            .ok_or_else(|| CopyError::Config("option --target is mandatory".to_string()))
    }
}
