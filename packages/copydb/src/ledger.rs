//! Completion ledger.
//!
//! Records which phase operations and which catalog objects are already done,
//! so that re-running the pipeline against the same working directory picks up
//! at the first unfinished step. `FileLedger` keeps one marker file per key;
//! only the existence of a marker matters, its contents are diagnostic.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

use crate::error::{CopyError, Result};
use crate::fsutil::write_durable;
use crate::layout::WorkdirLayout;
use crate::section::Step;

/// Durable presence tracking keyed by pipeline step and by object OID.
///
/// Lookups never fail: anything other than a readable "present" answer is
/// reported as not done, so an uncertain step is redone rather than skipped.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn is_step_done(&self, step: Step) -> bool;

    /// Record a step as done. Must be durable before returning `Ok`.
    async fn mark_step_done(&self, step: Step) -> Result<()>;

    async fn is_object_done(&self, oid: u32) -> bool;

    /// Diagnostic note stored with an object marker, if any.
    async fn object_note(&self, oid: u32) -> Option<String>;

    async fn mark_object_done(&self, oid: u32, note: &str) -> Result<()>;

    /// Where a step marker lives, for log messages.
    fn step_location(&self, step: Step) -> String;
}

/// Ledger backed by marker files in the working directory.
#[derive(Debug, Clone)]
pub struct FileLedger {
    layout: WorkdirLayout,
}

impl FileLedger {
    pub fn new(layout: WorkdirLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &WorkdirLayout {
        &self.layout
    }
}

#[async_trait]
impl Ledger for FileLedger {
    async fn is_step_done(&self, step: Step) -> bool {
        has_completed(&self.layout.step_marker(step)).await
    }

    async fn mark_step_done(&self, step: Step) -> Result<()> {
        record_completed(&self.layout.step_marker(step), "").await
    }

    async fn is_object_done(&self, oid: u32) -> bool {
        has_object_completed(&self.layout.index_dir, oid).await
    }

    async fn object_note(&self, oid: u32) -> Option<String> {
        fs::read_to_string(object_marker(&self.layout.index_dir, oid))
            .await
            .ok()
    }

    async fn mark_object_done(&self, oid: u32, note: &str) -> Result<()> {
        record_object_completed(&self.layout.index_dir, oid, note).await
    }

    fn step_location(&self, step: Step) -> String {
        self.layout.step_marker(step).display().to_string()
    }
}

/// True iff the marker file exists.
pub async fn has_completed(marker: &Path) -> bool {
    match fs::try_exists(marker).await {
        Ok(found) => found,
        Err(e) => {
            warn!(
                marker = %marker.display(),
                error = %e,
                "Could not check tracking file, assuming not done"
            );
            false
        }
    }
}

/// Create (or overwrite) a marker file durably.
pub async fn record_completed(marker: &Path, contents: &str) -> Result<()> {
    write_durable(marker, contents.as_bytes())
        .await
        .map_err(|source| CopyError::MarkerWrite {
            path: marker.to_path_buf(),
            source,
        })
}

/// True iff a marker for `oid` exists in `dir`. A missing directory means no.
pub async fn has_object_completed(dir: &Path, oid: u32) -> bool {
    has_completed(&object_marker(dir, oid)).await
}

pub async fn record_object_completed(dir: &Path, oid: u32, note: &str) -> Result<()> {
    record_completed(&object_marker(dir, oid), note).await
}

fn object_marker(dir: &Path, oid: u32) -> PathBuf {
    dir.join(format!("{oid}.done"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_step_marker_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(WorkdirLayout::new(dir.path()));

        assert!(!ledger.is_step_done(Step::PreDump).await);
        ledger.mark_step_done(Step::PreDump).await.unwrap();
        assert!(ledger.is_step_done(Step::PreDump).await);
        assert!(!ledger.is_step_done(Step::PostDump).await);

        // Recording again is harmless
        ledger.mark_step_done(Step::PreDump).await.unwrap();
        assert!(ledger.is_step_done(Step::PreDump).await);
    }

    #[tokio::test]
    async fn test_missing_object_dir_is_not_done() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(!has_object_completed(&missing, 11).await);
    }

    #[tokio::test]
    async fn test_object_marker_with_note() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(WorkdirLayout::new(dir.path()));

        ledger
            .mark_object_done(11, "CREATE INDEX a_idx ON a (id);")
            .await
            .unwrap();

        assert!(ledger.is_object_done(11).await);
        assert!(!ledger.is_object_done(12).await);
        assert_eq!(
            ledger.object_note(11).await.as_deref(),
            Some("CREATE INDEX a_idx ON a (id);")
        );
    }

    #[tokio::test]
    async fn test_empty_object_marker_still_counts() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkdirLayout::new(dir.path());
        std::fs::create_dir_all(&layout.index_dir).unwrap();
        std::fs::write(layout.object_marker(5), "").unwrap();

        let ledger = FileLedger::new(layout);
        assert!(ledger.is_object_done(5).await);
    }

    #[tokio::test]
    async fn test_marker_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the run directory should be
        let blocker = dir.path().join("run");
        std::fs::write(&blocker, "not a directory").unwrap();
        let ledger = FileLedger::new(WorkdirLayout::new(dir.path()));

        let err = ledger.mark_step_done(Step::PreRestore).await.unwrap_err();
        assert!(matches!(err, CopyError::MarkerWrite { .. }));
        assert!(!ledger.is_step_done(Step::PreRestore).await);
    }
}
