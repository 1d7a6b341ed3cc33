//! Filtered restore manifest for the post-data phase.
//!
//! The post-data archive holds every index and constraint of the source,
//! including the ones the concurrent index build already created on the
//! target. pg_restore can skip individual archive entries when given a list
//! file (`--use-list`) in which those entries are commented out:
//!
//! ```text
//! 214; 1259 16385
//! ;215; 1259 16386
//! 3051; 2606 16390
//! ```
//!
//! Entries are matched to ledger markers by object OID, which is unique per
//! catalog entry; names are not (they repeat across schemas and object kinds).
//! Line order is the archive's table-of-contents order and must not change.

use std::fmt::Write as _;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{CopyError, Result};
use crate::fsutil::write_durable;
use crate::ledger::Ledger;
use crate::tools::{ArchiveEntry, SchemaTools};

/// pg_restore treats lines starting with this as comments.
pub const COMMENT_PREFIX: char = ';';

/// Upper bound of one encoded line: prefix, i32, "; ", u32, " ", u32, newline.
const MAX_LINE_LEN: usize = 1 + 11 + 2 + 10 + 1 + 10 + 1;

/// One archive entry and whether pg_restore should skip it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLine {
    pub entry: ArchiveEntry,
    pub suppressed: bool,
}

/// Append the list-file line for `entry` to `buf`.
///
/// This is the only place that knows the pg_restore list grammar.
pub fn encode_line(buf: &mut String, entry: &ArchiveEntry, suppressed: bool) -> std::fmt::Result {
    if suppressed {
        buf.push(COMMENT_PREFIX);
    }
    writeln!(
        buf,
        "{}; {} {}",
        entry.dump_id, entry.catalog_oid, entry.object_oid
    )
}

/// Ordered selection list for pg_restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreManifest {
    lines: Vec<ManifestLine>,
}

impl RestoreManifest {
    pub fn new(lines: Vec<ManifestLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[ManifestLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn suppressed_count(&self) -> usize {
        self.lines.iter().filter(|l| l.suppressed).count()
    }

    /// Render the whole manifest. Either the complete text or an error.
    pub fn encode(&self) -> Result<String> {
        let capacity = self
            .lines
            .len()
            .checked_mul(MAX_LINE_LEN)
            .ok_or_else(|| CopyError::ManifestBuild("manifest too large".to_string()))?;

        let mut buf = String::new();
        buf.try_reserve(capacity)
            .map_err(|e| CopyError::ManifestBuild(format!("out of memory: {e}")))?;

        for line in &self.lines {
            encode_line(&mut buf, &line.entry, line.suppressed).map_err(|_| {
                CopyError::ManifestBuild(format!(
                    "could not format entry for dump id {}",
                    line.entry.dump_id
                ))
            })?;
        }
        Ok(buf)
    }
}

/// List the post-data archive and comment out every object the ledger
/// reports as already built.
pub async fn build_filtered_manifest(
    tools: &dyn SchemaTools,
    artifact: &Path,
    ledger: &dyn Ledger,
) -> Result<RestoreManifest> {
    if !fs::try_exists(artifact).await.unwrap_or(false) {
        return Err(CopyError::MissingArtifact {
            path: artifact.to_path_buf(),
        });
    }

    let entries = tools.list_contents(artifact).await?;

    let mut lines = Vec::new();
    lines
        .try_reserve_exact(entries.len())
        .map_err(|e| CopyError::ManifestBuild(format!("out of memory: {e}")))?;

    for entry in entries {
        let suppressed = ledger.is_object_done(entry.object_oid).await;
        if suppressed {
            let note = ledger.object_note(entry.object_oid).await;
            debug!(
                dump_id = entry.dump_id,
                oid = entry.object_oid,
                "Skipping dumpId {} ({})",
                entry.dump_id,
                last_line(note.as_deref()).unwrap_or(&entry.description)
            );
        }
        lines.push(ManifestLine { entry, suppressed });
    }

    let manifest = RestoreManifest::new(lines);
    info!(
        entries = manifest.len(),
        skipped = manifest.suppressed_count(),
        "Prepared post-data restore list"
    );
    Ok(manifest)
}

/// Write the encoded manifest so that no reader ever sees a partial file.
pub async fn write_manifest(manifest: &RestoreManifest, path: &Path) -> Result<()> {
    let contents = manifest.encode()?;
    write_durable(path, contents.as_bytes())
        .await
        .map_err(|source| CopyError::ManifestWrite {
            path: path.to_path_buf(),
            source,
        })
}

/// Last non-empty line of a marker note (the statement that built the object).
fn last_line(note: Option<&str>) -> Option<&str> {
    note?.lines().rev().map(str::trim).find(|l| !l.is_empty())
}
