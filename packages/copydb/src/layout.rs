//! Working directory layout.
//!
//! Every path copydb reads or writes is derived here from one root directory,
//! so a run can be resumed by pointing at the same root again:
//!
//! ```text
//! <root>/schema/pre.dump          pre-data archive
//! <root>/schema/post.dump         post-data archive
//! <root>/schema/post.list         filtered pg_restore manifest
//! <root>/run/<step>.done          phase operation markers
//! <root>/run/indexes/<oid>.done   objects already built on the target
//! ```

use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::error::{CopyError, Result};
use crate::section::{Phase, Step};

/// Paths for one pipeline working directory.
#[derive(Debug, Clone)]
pub struct WorkdirLayout {
    pub topdir: PathBuf,
    pub schema_dir: PathBuf,
    pub run_dir: PathBuf,
    /// Marker directory of the concurrent index and constraint build
    pub index_dir: PathBuf,
}

impl WorkdirLayout {
    pub fn new(topdir: impl Into<PathBuf>) -> Self {
        let topdir = topdir.into();
        let schema_dir = topdir.join("schema");
        let run_dir = topdir.join("run");
        let index_dir = run_dir.join("indexes");
        Self {
            topdir,
            schema_dir,
            run_dir,
            index_dir,
        }
    }

    /// `$TMPDIR/pgcopydb`, falling back to `/tmp/pgcopydb`.
    pub fn default_topdir() -> PathBuf {
        env::var_os("TMPDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("pgcopydb")
    }

    /// Archive file for a phase.
    pub fn dump_file(&self, phase: Phase) -> PathBuf {
        match phase {
            Phase::PreData => self.schema_dir.join("pre.dump"),
            Phase::PostData => self.schema_dir.join("post.dump"),
        }
    }

    /// Filtered manifest handed to `pg_restore --use-list`.
    pub fn list_file(&self) -> PathBuf {
        self.schema_dir.join("post.list")
    }

    pub fn step_marker(&self, step: Step) -> PathBuf {
        self.run_dir.join(format!("{}.done", step.as_str()))
    }

    pub fn object_marker(&self, oid: u32) -> PathBuf {
        self.index_dir.join(format!("{oid}.done"))
    }

    /// Prepare the directory tree for a run.
    ///
    /// A directory holding markers from a previous run is only accepted with
    /// `resume`; `restart` wipes it first.
    pub async fn init(&self, restart: bool, resume: bool) -> Result<()> {
        if restart && resume {
            return Err(CopyError::Config(
                "options --restart and --resume are not compatible".to_string(),
            ));
        }

        if exists(&self.topdir).await {
            if restart {
                if self.topdir.parent().is_none() {
                    return Err(self.workdir_error("refusing to remove a filesystem root"));
                }
                info!(dir = %self.topdir.display(), "Removing previous working directory");
                fs::remove_dir_all(&self.topdir)
                    .await
                    .map_err(|source| CopyError::Io {
                        path: self.topdir.clone(),
                        source,
                    })?;
            } else if self.has_previous_run().await? && !resume {
                return Err(self.workdir_error(
                    "a previous run was found, use --resume to continue it or --restart to start over",
                ));
            }
        }

        for dir in [&self.schema_dir, &self.run_dir, &self.index_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| CopyError::Io {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    async fn has_previous_run(&self) -> Result<bool> {
        for step in Step::ALL {
            if exists(&self.step_marker(step)).await {
                return Ok(true);
            }
        }
        if !exists(&self.index_dir).await {
            return Ok(false);
        }
        let mut entries = fs::read_dir(&self.index_dir)
            .await
            .map_err(|source| CopyError::Io {
                path: self.index_dir.clone(),
                source,
            })?;
        let first = entries
            .next_entry()
            .await
            .map_err(|source| CopyError::Io {
                path: self.index_dir.clone(),
                source,
            })?;
        Ok(first.is_some())
    }

    fn workdir_error(&self, reason: &str) -> CopyError {
        CopyError::Workdir {
            path: self.topdir.clone(),
            reason: reason.to_string(),
        }
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}
