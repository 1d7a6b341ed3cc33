//! Schema migration pipeline.
//!
//! ```text
//! dump pre-data, post-data (same snapshot)
//!     → restore pre-data
//!     → bulk data copy (external)
//!     → restore post-data, minus objects already built
//! ```
//!
//! Every step is guarded by its ledger marker, so running the pipeline again
//! after a failure resumes from the first step that did not complete.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::artifact::PhaseArtifact;
use crate::context::MigrationContext;
use crate::dump::dump_source_schema;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::restore::{finalize_schema, prepare_schema};
use crate::section::{DumpSection, Step};
use crate::tools::SchemaTools;

/// Bulk table copy run between the two restore phases.
#[async_trait]
pub trait DataCopy: Send + Sync {
    async fn copy_data(&self, ctx: &MigrationContext) -> Result<()>;
}

/// Copies no data; used to migrate the schema alone.
pub struct SchemaOnly;

#[async_trait]
impl DataCopy for SchemaOnly {
    async fn copy_data(&self, _ctx: &MigrationContext) -> Result<()> {
        info!("Schema only, skipping table data");
        Ok(())
    }
}

/// Completion state of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatus {
    pub step: Step,
    pub done: bool,
    pub marker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub steps: Vec<StepStatus>,
}

impl PipelineStatus {
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.done)
    }
}

pub struct Pipeline {
    ctx: Arc<MigrationContext>,
    tools: Arc<dyn SchemaTools>,
    ledger: Arc<dyn Ledger>,
}

impl Pipeline {
    pub fn new(
        ctx: Arc<MigrationContext>,
        tools: Arc<dyn SchemaTools>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self { ctx, tools, ledger }
    }

    pub fn context(&self) -> &MigrationContext {
        &self.ctx
    }

    pub async fn dump_schema(&self, section: DumpSection) -> Result<Vec<PhaseArtifact>> {
        dump_source_schema(
            &self.ctx,
            self.tools.as_ref(),
            self.ledger.as_ref(),
            self.ctx.snapshot.as_deref(),
            section,
        )
        .await
    }

    pub async fn prepare_schema(&self) -> Result<()> {
        prepare_schema(&self.ctx, self.tools.as_ref(), self.ledger.as_ref()).await
    }

    pub async fn finalize_schema(&self) -> Result<()> {
        finalize_schema(&self.ctx, self.tools.as_ref(), self.ledger.as_ref()).await
    }

    /// Run every step in order. Steps already recorded are skipped.
    pub async fn run(&self, data_copy: &dyn DataCopy) -> Result<()> {
        self.dump_schema(DumpSection::Schema).await?;
        self.prepare_schema().await?;
        data_copy.copy_data(&self.ctx).await?;
        self.finalize_schema().await?;
        info!("Schema migration complete");
        Ok(())
    }

    pub async fn status(&self) -> PipelineStatus {
        ledger_status(self.ledger.as_ref()).await
    }
}

/// Step completion as recorded in `ledger`, in pipeline order.
pub async fn ledger_status(ledger: &dyn Ledger) -> PipelineStatus {
    let mut steps = Vec::with_capacity(Step::ALL.len());
    for step in Step::ALL {
        steps.push(StepStatus {
            step,
            done: ledger.is_step_done(step).await,
            marker: ledger.step_location(step),
        });
    }
    PipelineStatus { steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::WorkdirLayout;
    use crate::testing::{MemoryLedger, MockTools, MockToolsCall};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and records how many restores happened before it ran.
    struct CountingCopy {
        tools: Arc<MockTools>,
        runs: AtomicUsize,
        restores_before: AtomicUsize,
    }

    #[async_trait]
    impl DataCopy for CountingCopy {
        async fn copy_data(&self, _ctx: &MigrationContext) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.restores_before
                .store(self.tools.restore_count(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn pipeline(dir: &std::path::Path, tools: Arc<MockTools>) -> Pipeline {
        let ctx = MigrationContext::new(WorkdirLayout::new(dir))
            .with_source("postgres://src/shop")
            .with_target("postgres://dst/shop");
        Pipeline::new(Arc::new(ctx), tools, Arc::new(MemoryLedger::new()))
    }

    #[tokio::test]
    async fn test_run_orders_steps() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(MockTools::new());
        let pipeline = pipeline(dir.path(), tools.clone());
        let copy = CountingCopy {
            tools: tools.clone(),
            runs: AtomicUsize::new(0),
            restores_before: AtomicUsize::new(0),
        };

        pipeline.run(&copy).await.unwrap();

        assert_eq!(copy.runs.load(Ordering::SeqCst), 1);
        // Only the pre-data restore happened before the data copy
        assert_eq!(copy.restores_before.load(Ordering::SeqCst), 1);

        let kinds: Vec<&str> = tools
            .calls()
            .iter()
            .map(|c| match c {
                MockToolsCall::Dump { .. } => "dump",
                MockToolsCall::Restore { .. } => "restore",
                MockToolsCall::List { .. } => "list",
            })
            .collect();
        assert_eq!(kinds, vec!["dump", "dump", "restore", "list", "restore"]);
        assert!(pipeline.status().await.is_complete());
    }

    #[tokio::test]
    async fn test_status_reports_each_step() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), Arc::new(MockTools::new()));

        pipeline.dump_schema(DumpSection::PreData).await.unwrap();
        let status = pipeline.status().await;

        let done: Vec<(Step, bool)> = status.steps.iter().map(|s| (s.step, s.done)).collect();
        assert_eq!(
            done,
            vec![
                (Step::PreDump, true),
                (Step::PreRestore, false),
                (Step::PostDump, false),
                (Step::PostRestore, false),
            ]
        );
        assert!(!status.is_complete());

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["steps"][0]["step"], "pre_dump");
        assert_eq!(json["steps"][0]["done"], true);
    }
}
