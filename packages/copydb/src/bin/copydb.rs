//! Schema dump and restore between two Postgres instances.
//!
//! Re-running a command against the same `--dir` skips every step that
//! already completed. `status` and `restore parse-list` print to stdout; logs
//! go to stderr.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use copydb::{
    build_filtered_manifest, ledger_status, scrub_uri, validate_connection_string, Config,
    DumpSection, FileLedger, MigrationContext, Phase, PhaseArtifact, PgPaths, PgTools, Pipeline,
    RestoreOptions, SchemaOnly, WorkdirLayout,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "copydb")]
#[command(about = "Resumable two-phase schema copy between Postgres instances")]
struct Cli {
    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the source schema into the working directory
    Dump {
        #[arg(value_enum)]
        section: SectionArg,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        dir: RunDirArgs,
    },

    /// Restore a dumped schema phase into the target
    #[command(subcommand)]
    Restore(RestoreCommand),

    /// Dump and restore in one go
    #[command(subcommand)]
    Copy(CopyCommand),

    /// Print the completion state of every step as JSON
    Status {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum RestoreCommand {
    /// Restore the pre-data archive
    PreData(RestoreArgs),

    /// Restore the post-data archive, minus objects already built
    PostData(RestoreArgs),

    /// Print the post-data restore list without restoring
    ParseList {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CopyCommand {
    /// Copy the schema alone: both dumps, then both restores
    Schema {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        dir: RunDirArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SectionArg {
    Schema,
    PreData,
    PostData,
    All,
}

impl From<SectionArg> for DumpSection {
    fn from(arg: SectionArg) -> Self {
        match arg {
            SectionArg::Schema => DumpSection::Schema,
            SectionArg::PreData => DumpSection::PreData,
            SectionArg::PostData => DumpSection::PostData,
            SectionArg::All => DumpSection::All,
        }
    }
}

#[derive(Args)]
struct SourceArgs {
    /// Source connection string [env: PGCOPYDB_SOURCE_PGURI]
    #[arg(long)]
    source: Option<String>,

    /// Exported snapshot to dump from [env: PGCOPYDB_SNAPSHOT]
    #[arg(long)]
    snapshot: Option<String>,

    /// Allow dumps that do not share one snapshot
    #[arg(long)]
    not_consistent: bool,
}

#[derive(Args)]
struct TargetArgs {
    /// Target connection string [env: PGCOPYDB_TARGET_PGURI]
    #[arg(long)]
    target: Option<String>,

    /// Drop objects before recreating them
    #[arg(long)]
    drop_if_exists: bool,

    #[arg(long)]
    no_owner: bool,

    #[arg(long)]
    no_acl: bool,

    #[arg(long)]
    no_comments: bool,

    #[arg(long)]
    no_tablespaces: bool,
}

#[derive(Args)]
struct RunDirArgs {
    /// Working directory [env: PGCOPYDB_DIR]
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Remove the working directory of a previous run first
    #[arg(long)]
    restart: bool,

    /// Continue a previous run, skipping completed steps
    #[arg(long)]
    resume: bool,
}

#[derive(Args)]
struct RestoreArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Working directory of a previous dump [env: PGCOPYDB_DIR]
    #[arg(long)]
    dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Dump {
            section,
            source,
            dir,
        } => cmd_dump(&config, section.into(), &source, &dir).await,
        Commands::Restore(RestoreCommand::PreData(args)) => {
            cmd_restore(&config, Phase::PreData, &args).await
        }
        Commands::Restore(RestoreCommand::PostData(args)) => {
            cmd_restore(&config, Phase::PostData, &args).await
        }
        Commands::Restore(RestoreCommand::ParseList { dir }) => {
            cmd_parse_list(&config, dir).await
        }
        Commands::Copy(CopyCommand::Schema {
            source,
            target,
            dir,
        }) => cmd_copy_schema(&config, &source, &target, &dir).await,
        Commands::Status { dir } => cmd_status(&config, dir).await,
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ============================================================================
// Option resolution
// ============================================================================

fn resolve_layout(config: &Config, dir: Option<PathBuf>) -> WorkdirLayout {
    let topdir = dir.unwrap_or_else(|| config.workdir());
    WorkdirLayout::new(topdir)
}

fn resolve_source(
    config: &Config,
    args: &SourceArgs,
    layout: WorkdirLayout,
    resume: bool,
) -> Result<MigrationContext> {
    let Some(source) = args.source.clone().or_else(|| config.source_uri.clone()) else {
        bail!("Option --source is mandatory");
    };
    validate_connection_string(&source).context("Invalid --source connection string")?;

    let snapshot = args.snapshot.clone().or_else(|| config.snapshot.clone());
    if resume && !args.not_consistent && snapshot.is_none() {
        bail!(
            "Option --resume requires --not-consistent when no --snapshot is given: \
             the snapshot of the interrupted run is gone"
        );
    }

    Ok(MigrationContext::new(layout)
        .with_source(source)
        .with_snapshot(snapshot))
}

fn resolve_target(config: &Config, args: &TargetArgs) -> Result<(String, RestoreOptions)> {
    let Some(target) = args.target.clone().or_else(|| config.target_uri.clone()) else {
        bail!("Option --target is mandatory");
    };
    validate_connection_string(&target).context("Invalid --target connection string")?;

    let options = RestoreOptions {
        drop_if_exists: args.drop_if_exists || config.drop_if_exists,
        no_owner: args.no_owner,
        no_acl: args.no_acl,
        no_comments: args.no_comments,
        no_tablespaces: args.no_tablespaces,
    };
    Ok((target, options))
}

async fn locate_tools(config: &Config) -> Result<PgTools> {
    let paths = PgPaths::locate(config.pg_bindir.as_deref())?
        .detect_version()
        .await
        .context("Failed to run pg_dump --version")?;
    info!(
        "Using pg_dump for Postgres \"{}\" at \"{}\"",
        paths.version.as_ref().map_or("unknown", |v| v.text.as_str()),
        paths.pg_dump.display()
    );
    Ok(PgTools::new(paths))
}

fn pipeline(ctx: MigrationContext, tools: PgTools) -> Pipeline {
    let ledger = FileLedger::new(ctx.layout.clone());
    Pipeline::new(Arc::new(ctx), Arc::new(tools), Arc::new(ledger))
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_dump(
    config: &Config,
    section: DumpSection,
    source: &SourceArgs,
    dir: &RunDirArgs,
) -> Result<()> {
    let layout = resolve_layout(config, dir.dir.clone());
    let ctx = resolve_source(config, source, layout, dir.resume)?;
    ctx.layout.init(dir.restart, dir.resume).await?;

    info!(
        "Dumping database from \"{}\"",
        scrub_uri(ctx.source_uri.as_deref().unwrap_or_default())
    );
    info!("Dumping database into directory \"{}\"", ctx.layout.topdir.display());

    let tools = locate_tools(config).await?;
    pipeline(ctx, tools).dump_schema(section).await?;
    Ok(())
}

async fn cmd_restore(config: &Config, phase: Phase, args: &RestoreArgs) -> Result<()> {
    let (target, options) = resolve_target(config, &args.target)?;
    let layout = resolve_layout(config, args.dir.clone());
    // Restoring consumes what a previous dump left in the directory
    layout.init(false, true).await?;

    let ctx = MigrationContext::new(layout)
        .with_target(target)
        .with_restore_options(options);
    let tools = locate_tools(config).await?;
    let pipeline = pipeline(ctx, tools);

    match phase {
        Phase::PreData => pipeline.prepare_schema().await?,
        Phase::PostData => pipeline.finalize_schema().await?,
    }
    Ok(())
}

async fn cmd_parse_list(config: &Config, dir: Option<PathBuf>) -> Result<()> {
    let layout = resolve_layout(config, dir);
    let artifact = PhaseArtifact::for_phase(&layout, Phase::PostData);
    let ledger = FileLedger::new(layout);
    let tools = locate_tools(config).await?;

    let manifest = build_filtered_manifest(&tools, &artifact.path, &ledger).await?;
    print!("{}", manifest.encode()?);
    Ok(())
}

async fn cmd_copy_schema(
    config: &Config,
    source: &SourceArgs,
    target: &TargetArgs,
    dir: &RunDirArgs,
) -> Result<()> {
    let layout = resolve_layout(config, dir.dir.clone());
    let (target, options) = resolve_target(config, target)?;
    let ctx = resolve_source(config, source, layout, dir.resume)?
        .with_target(target)
        .with_restore_options(options);
    ctx.layout.init(dir.restart, dir.resume).await?;

    info!(
        "Copying schema from \"{}\" to \"{}\"",
        scrub_uri(ctx.source_uri.as_deref().unwrap_or_default()),
        scrub_uri(ctx.target_uri.as_deref().unwrap_or_default())
    );

    let tools = locate_tools(config).await?;
    pipeline(ctx, tools).run(&SchemaOnly).await?;
    Ok(())
}

async fn cmd_status(config: &Config, dir: Option<PathBuf>) -> Result<()> {
    let ledger = FileLedger::new(resolve_layout(config, dir));
    let status = ledger_status(&ledger).await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
