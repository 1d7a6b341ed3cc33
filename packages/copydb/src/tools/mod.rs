//! External dump, restore and listing capabilities.
//!
//! These are infrastructure seams only: the pipeline decides when to call
//! them, implementations decide how. `PgTools` drives the real Postgres
//! client binaries; `testing::MockTools` records calls for tests.

mod cmd;
pub mod pg;
pub mod toc;

pub use cmd::{CmdBuilder, CmdOutput};
pub use pg::{PgPaths, PgTools, PgVersion};
pub use toc::{parse_listing, ArchiveEntry};

use async_trait::async_trait;
use std::path::Path;

use crate::context::RestoreOptions;
use crate::error::Result;
use crate::section::Phase;

#[async_trait]
pub trait SchemaTools: Send + Sync {
    /// Dump one schema phase of `source` into `output`.
    async fn dump(
        &self,
        source: &str,
        snapshot: Option<&str>,
        phase: Phase,
        output: &Path,
    ) -> Result<()>;

    /// Apply `artifact` to `target`, restricted to the active lines of
    /// `manifest` when one is given.
    async fn restore(
        &self,
        target: &str,
        artifact: &Path,
        manifest: Option<&Path>,
        options: &RestoreOptions,
    ) -> Result<()>;

    /// Table of contents of `artifact`, in restore order.
    async fn list_contents(&self, artifact: &Path) -> Result<Vec<ArchiveEntry>>;
}
