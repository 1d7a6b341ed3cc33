//! Phase dumper: `pg_dump --section` once per phase, guarded by the ledger.

use tracing::{error, info};

use crate::artifact::PhaseArtifact;
use crate::context::MigrationContext;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::section::{DumpSection, Phase};
use crate::tools::SchemaTools;
use crate::uri::scrub_uri;

/// Dump the requested section of the source schema.
///
/// `Schema` and `All` dump pre-data then post-data. A phase whose dump marker
/// exists is skipped; its archive is trusted as it is. The marker is written
/// only after the dump returned successfully, so a failed or interrupted dump
/// is redone in full on the next run.
pub async fn dump_source_schema(
    ctx: &MigrationContext,
    tools: &dyn SchemaTools,
    ledger: &dyn Ledger,
    snapshot: Option<&str>,
    section: DumpSection,
) -> Result<Vec<PhaseArtifact>> {
    let mut artifacts = Vec::with_capacity(section.phases().len());
    for &phase in section.phases() {
        artifacts.push(dump_phase(ctx, tools, ledger, snapshot, phase).await?);
    }
    Ok(artifacts)
}

/// Dump one phase unless its marker says it is already done.
pub async fn dump_phase(
    ctx: &MigrationContext,
    tools: &dyn SchemaTools,
    ledger: &dyn Ledger,
    snapshot: Option<&str>,
    phase: Phase,
) -> Result<PhaseArtifact> {
    let artifact = PhaseArtifact::for_phase(&ctx.layout, phase);
    let step = phase.dump_step();

    if ledger.is_step_done(step).await {
        info!(
            "Skipping pg_dump --section={}, as \"{}\" already exists",
            phase,
            ledger.step_location(step)
        );
        return Ok(artifact);
    }

    let source = ctx.source()?;
    info!(
        source = %scrub_uri(source),
        snapshot = snapshot.unwrap_or("none"),
        file = %artifact.path.display(),
        "Dumping {} schema",
        phase
    );

    tools.dump(source, snapshot, phase, &artifact.path).await?;

    if let Err(e) = ledger.mark_step_done(step).await {
        error!(error = %e, "pg_dump --section={} succeeded but could not be recorded", phase);
        return Err(e);
    }
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CopyError;
    use crate::layout::WorkdirLayout;
    use crate::section::Step;
    use crate::testing::{MemoryLedger, MockTools, MockToolsCall};

    fn context(dir: &std::path::Path) -> MigrationContext {
        MigrationContext::new(WorkdirLayout::new(dir)).with_source("postgres://src/shop")
    }

    #[tokio::test]
    async fn test_schema_section_dumps_both_phases_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let tools = MockTools::new();
        let ledger = MemoryLedger::new();

        let artifacts = dump_source_schema(
            &ctx,
            &tools,
            &ledger,
            Some("00000003-00000002-1"),
            DumpSection::Schema,
        )
        .await
        .unwrap();

        assert_eq!(
            artifacts.iter().map(|a| a.phase).collect::<Vec<_>>(),
            vec![Phase::PreData, Phase::PostData]
        );
        assert_eq!(
            tools.calls(),
            vec![
                MockToolsCall::Dump {
                    phase: Phase::PreData,
                    snapshot: Some("00000003-00000002-1".to_string()),
                    output: ctx.layout.dump_file(Phase::PreData),
                },
                MockToolsCall::Dump {
                    phase: Phase::PostData,
                    snapshot: Some("00000003-00000002-1".to_string()),
                    output: ctx.layout.dump_file(Phase::PostData),
                },
            ]
        );
        assert!(ledger.is_step_done(Step::PreDump).await);
        assert!(ledger.is_step_done(Step::PostDump).await);
    }

    #[tokio::test]
    async fn test_single_phase_section() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let tools = MockTools::new();
        let ledger = MemoryLedger::new();

        dump_source_schema(&ctx, &tools, &ledger, None, DumpSection::PostData)
            .await
            .unwrap();

        assert_eq!(tools.dump_count(Phase::PreData), 0);
        assert_eq!(tools.dump_count(Phase::PostData), 1);
        assert!(!ledger.is_step_done(Step::PreDump).await);
    }

    #[tokio::test]
    async fn test_failed_dump_is_not_marked() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let tools = MockTools::new().fail_dump(Phase::PostData);
        let ledger = MemoryLedger::new();

        let err = dump_source_schema(&ctx, &tools, &ledger, None, DumpSection::All)
            .await
            .unwrap_err();

        assert!(err.is_tool_failure());
        assert!(ledger.is_step_done(Step::PreDump).await);
        assert!(!ledger.is_step_done(Step::PostDump).await);
    }

    #[tokio::test]
    async fn test_marker_failure_surfaces_after_successful_dump() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let tools = MockTools::new();
        let ledger = MemoryLedger::new().failing_marks();

        let err = dump_source_schema(&ctx, &tools, &ledger, None, DumpSection::PreData)
            .await
            .unwrap_err();

        assert!(matches!(err, CopyError::MarkerWrite { .. }));
        assert_eq!(tools.dump_count(Phase::PreData), 1);
    }

    #[tokio::test]
    async fn test_done_phase_needs_no_source() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = MigrationContext::new(WorkdirLayout::new(dir.path()));
        let tools = MockTools::new();
        let ledger = MemoryLedger::new().with_step(Step::PreDump);

        dump_source_schema(&ctx, &tools, &ledger, None, DumpSection::PreData)
            .await
            .unwrap();
        assert!(tools.calls().is_empty());

        let err = dump_source_schema(&ctx, &tools, &ledger, None, DumpSection::PostData)
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::Config(_)));
    }
}
