//! Phase artifacts: archive files produced by dumping one schema phase.

use std::path::PathBuf;
use tokio::fs;

use crate::layout::WorkdirLayout;
use crate::section::Phase;

/// A phase archive at its fixed location in the working directory.
///
/// Written once by the dumper and never modified afterwards. A file left
/// behind by an interrupted dump has no marker and is overwritten by the
/// next dump of that phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseArtifact {
    pub phase: Phase,
    pub path: PathBuf,
}

impl PhaseArtifact {
    pub fn new(phase: Phase, path: impl Into<PathBuf>) -> Self {
        Self {
            phase,
            path: path.into(),
        }
    }

    pub fn for_phase(layout: &WorkdirLayout, phase: Phase) -> Self {
        Self::new(phase, layout.dump_file(phase))
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }
}
