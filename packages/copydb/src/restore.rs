//! Phase restorer: `pg_restore` once per phase, guarded by the ledger.

use std::path::Path;
use tracing::{error, info, warn};

use crate::artifact::PhaseArtifact;
use crate::context::MigrationContext;
use crate::error::{CopyError, Result};
use crate::ledger::Ledger;
use crate::manifest::{build_filtered_manifest, write_manifest};
use crate::section::Phase;
use crate::tools::SchemaTools;
use crate::uri::scrub_uri;

/// Restore one phase archive into the target.
///
/// The archive must exist even when the restore marker says the phase is
/// done: a missing archive means the working directory is not the one the
/// markers were written for. An archive without its dump marker is the
/// leftover of an interrupted dump and is never restored.
pub async fn restore_phase(
    ctx: &MigrationContext,
    tools: &dyn SchemaTools,
    ledger: &dyn Ledger,
    artifact: &PhaseArtifact,
    manifest: Option<&Path>,
) -> Result<()> {
    ensure_artifact(artifact, ledger).await?;

    let step = artifact.phase.restore_step();
    if ledger.is_step_done(step).await {
        info!(
            "Skipping pg_restore for {}, as \"{}\" already exists",
            artifact.phase,
            ledger.step_location(step)
        );
        return Ok(());
    }

    let target = ctx.target()?;
    info!(
        target = %scrub_uri(target),
        file = %artifact.path.display(),
        list = %manifest.map(|p| p.display().to_string()).unwrap_or_default(),
        "Restoring {} schema",
        artifact.phase
    );

    tools
        .restore(target, &artifact.path, manifest, &ctx.restore_options)
        .await?;

    if let Err(e) = ledger.mark_step_done(step).await {
        error!(
            error = %e,
            "pg_restore for {} succeeded but could not be recorded",
            artifact.phase
        );
        return Err(e);
    }
    Ok(())
}

/// Restore the pre-data archive: types, tables and functions, nothing that
/// depends on table contents.
pub async fn prepare_schema(
    ctx: &MigrationContext,
    tools: &dyn SchemaTools,
    ledger: &dyn Ledger,
) -> Result<()> {
    let artifact = PhaseArtifact::for_phase(&ctx.layout, Phase::PreData);
    restore_phase(ctx, tools, ledger, &artifact, None).await
}

/// Restore the post-data archive, skipping every index and constraint the
/// ledger reports as already built.
///
/// The list file is rebuilt from the current ledger on every attempt, so
/// objects finished by the index step since the last attempt are honored.
pub async fn finalize_schema(
    ctx: &MigrationContext,
    tools: &dyn SchemaTools,
    ledger: &dyn Ledger,
) -> Result<()> {
    let artifact = PhaseArtifact::for_phase(&ctx.layout, Phase::PostData);
    ensure_artifact(&artifact, ledger).await?;

    let step = artifact.phase.restore_step();
    if ledger.is_step_done(step).await {
        info!(
            "Skipping pg_restore for {}, as \"{}\" already exists",
            artifact.phase,
            ledger.step_location(step)
        );
        return Ok(());
    }

    let list_file = ctx.layout.list_file();
    let manifest = build_filtered_manifest(tools, &artifact.path, ledger).await?;
    write_manifest(&manifest, &list_file).await?;

    restore_phase(ctx, tools, ledger, &artifact, Some(&list_file)).await
}

async fn ensure_artifact(artifact: &PhaseArtifact, ledger: &dyn Ledger) -> Result<()> {
    if !artifact.exists().await {
        error!(
            file = %artifact.path.display(),
            "{} archive is missing, dump it again with --restart",
            artifact.phase
        );
        return Err(CopyError::MissingArtifact {
            path: artifact.path.clone(),
        });
    }

    let dump_step = artifact.phase.dump_step();
    if !ledger.is_step_done(dump_step).await {
        warn!(
            file = %artifact.path.display(),
            marker = %ledger.step_location(dump_step),
            "{} archive has no dump marker, the dump did not finish",
            artifact.phase
        );
        return Err(CopyError::IncompleteArtifact {
            path: artifact.path.clone(),
        });
    }
    Ok(())
}
