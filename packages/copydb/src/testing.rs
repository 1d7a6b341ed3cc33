//! Testing utilities including mock implementations.
//!
//! These are useful for testing the pipeline without Postgres binaries or a
//! working directory on disk.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::context::RestoreOptions;
use crate::error::{CopyError, Result};
use crate::ledger::Ledger;
use crate::section::{Phase, Step};
use crate::tools::{ArchiveEntry, SchemaTools};

/// In-memory ledger. State is lost when it is dropped.
#[derive(Default)]
pub struct MemoryLedger {
    steps: RwLock<HashSet<Step>>,
    objects: RwLock<HashMap<u32, String>>,
    fail_marks: bool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-mark a step as done.
    pub fn with_step(self, step: Step) -> Self {
        self.steps.write().unwrap().insert(step);
        self
    }

    /// Pre-mark an object as built by the concurrent index step.
    pub fn with_object(self, oid: u32, note: impl Into<String>) -> Self {
        self.objects.write().unwrap().insert(oid, note.into());
        self
    }

    /// Make every `mark_*` call fail like a full disk would.
    pub fn failing_marks(mut self) -> Self {
        self.fail_marks = true;
        self
    }

    fn mark_error(&self, key: String) -> CopyError {
        CopyError::MarkerWrite {
            path: PathBuf::from(format!("memory://{key}")),
            source: io::Error::new(io::ErrorKind::Other, "mock marker failure"),
        }
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn is_step_done(&self, step: Step) -> bool {
        self.steps.read().unwrap().contains(&step)
    }

    async fn mark_step_done(&self, step: Step) -> Result<()> {
        if self.fail_marks {
            return Err(self.mark_error(step.to_string()));
        }
        self.steps.write().unwrap().insert(step);
        Ok(())
    }

    async fn is_object_done(&self, oid: u32) -> bool {
        self.objects.read().unwrap().contains_key(&oid)
    }

    async fn object_note(&self, oid: u32) -> Option<String> {
        self.objects.read().unwrap().get(&oid).cloned()
    }

    async fn mark_object_done(&self, oid: u32, note: &str) -> Result<()> {
        if self.fail_marks {
            return Err(self.mark_error(oid.to_string()));
        }
        self.objects.write().unwrap().insert(oid, note.to_string());
        Ok(())
    }

    fn step_location(&self, step: Step) -> String {
        format!("memory://{step}")
    }
}

/// Record of a call made to the mock tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockToolsCall {
    Dump {
        phase: Phase,
        snapshot: Option<String>,
        output: PathBuf,
    },
    Restore {
        artifact: PathBuf,
        manifest: Option<PathBuf>,
        /// Manifest file contents at the time of the call
        manifest_contents: Option<String>,
        options: RestoreOptions,
    },
    List {
        artifact: PathBuf,
    },
}

/// A call plus whether each watched path existed when it was made.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call: MockToolsCall,
    pub watched: Vec<(PathBuf, bool)>,
}

/// Mock dump/restore/list tools.
///
/// `dump` writes a small placeholder archive so later steps find a file.
#[derive(Default)]
pub struct MockTools {
    contents: RwLock<Vec<ArchiveEntry>>,
    fail_dump: RwLock<HashSet<Phase>>,
    fail_restore: RwLock<bool>,
    fail_list: bool,
    watched: Vec<PathBuf>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
}

impl MockTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table of contents returned by `list_contents`.
    pub fn with_contents(self, entries: Vec<ArchiveEntry>) -> Self {
        *self.contents.write().unwrap() = entries;
        self
    }

    /// Record whether `path` exists at the moment of every call.
    pub fn watch(mut self, path: impl Into<PathBuf>) -> Self {
        self.watched.push(path.into());
        self
    }

    pub fn fail_dump(self, phase: Phase) -> Self {
        self.fail_dump.write().unwrap().insert(phase);
        self
    }

    pub fn fail_restore(self) -> Self {
        *self.fail_restore.write().unwrap() = true;
        self
    }

    pub fn fail_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Stop failing, as if the operator fixed the problem before re-running.
    pub fn heal(&self) {
        self.fail_dump.write().unwrap().clear();
        *self.fail_restore.write().unwrap() = false;
    }

    pub fn calls(&self) -> Vec<MockToolsCall> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .map(|r| r.call.clone())
            .collect()
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    pub fn dump_count(&self, phase: Phase) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockToolsCall::Dump { phase: p, .. } if *p == phase))
            .count()
    }

    pub fn restore_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockToolsCall::Restore { .. }))
            .count()
    }

    fn record(&self, call: MockToolsCall) {
        let watched = self
            .watched
            .iter()
            .map(|p| (p.clone(), p.exists()))
            .collect();
        self.calls
            .write()
            .unwrap()
            .push(RecordedCall { call, watched });
    }

    fn failure(tool: &str) -> CopyError {
        CopyError::ToolFailed {
            tool: tool.to_string(),
            code: Some(1),
            stderr: "mock failure".to_string(),
        }
    }
}

#[async_trait]
impl SchemaTools for MockTools {
    async fn dump(
        &self,
        _source: &str,
        snapshot: Option<&str>,
        phase: Phase,
        output: &Path,
    ) -> Result<()> {
        self.record(MockToolsCall::Dump {
            phase,
            snapshot: snapshot.map(str::to_string),
            output: output.to_path_buf(),
        });

        if self.fail_dump.read().unwrap().contains(&phase) {
            return Err(Self::failure("pg_dump"));
        }

        let io_err = |source: io::Error| CopyError::Io {
            path: output.to_path_buf(),
            source,
        };
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(output, format!("mock {phase} archive"))
            .await
            .map_err(io_err)
    }

    async fn restore(
        &self,
        _target: &str,
        artifact: &Path,
        manifest: Option<&Path>,
        options: &RestoreOptions,
    ) -> Result<()> {
        let manifest_contents = match manifest {
            Some(path) => tokio::fs::read_to_string(path).await.ok(),
            None => None,
        };
        self.record(MockToolsCall::Restore {
            artifact: artifact.to_path_buf(),
            manifest: manifest.map(Path::to_path_buf),
            manifest_contents,
            options: options.clone(),
        });

        if *self.fail_restore.read().unwrap() {
            return Err(Self::failure("pg_restore"));
        }
        Ok(())
    }

    async fn list_contents(&self, artifact: &Path) -> Result<Vec<ArchiveEntry>> {
        self.record(MockToolsCall::List {
            artifact: artifact.to_path_buf(),
        });

        if self.fail_list {
            return Err(Self::failure("pg_restore"));
        }
        Ok(self.contents.read().unwrap().clone())
    }
}
