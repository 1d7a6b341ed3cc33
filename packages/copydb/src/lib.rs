//! Resumable Schema Migration
//!
//! Copies a Postgres schema from a source instance to a target instance in
//! two ordered phases, around an external bulk data copy:
//!
//! - **pre-data**: tables, types and functions, restored before the data
//! - **post-data**: indexes, constraints and triggers, restored after it
//!
//! Every dump and restore is recorded in a [`Ledger`] once it succeeds, so an
//! interrupted run can be re-executed against the same working directory and
//! continue where it stopped. The post-data restore skips every index or
//! constraint that a concurrent index build already created on the target.
//!
//! # Usage
//!
//! ```rust,ignore
//! use copydb::{FileLedger, MigrationContext, PgPaths, PgTools, Pipeline, SchemaOnly, WorkdirLayout};
//!
//! let layout = WorkdirLayout::new("/tmp/pgcopydb");
//! layout.init(false, true).await?;
//!
//! let ctx = MigrationContext::new(layout.clone())
//!     .with_source("postgres://source/app")
//!     .with_target("postgres://target/app");
//! let tools = PgTools::new(PgPaths::locate(None)?.detect_version().await?);
//! let pipeline = Pipeline::new(Arc::new(ctx), Arc::new(tools), Arc::new(FileLedger::new(layout)));
//!
//! pipeline.run(&SchemaOnly).await?;
//! ```
//!
//! # Modules
//!
//! - [`dump`] / [`restore`] - Ledger-guarded phase operations
//! - [`manifest`] - Filtered pg_restore list for the post-data phase
//! - [`ledger`] - Completion markers (file-backed)
//! - [`tools`] - pg_dump / pg_restore invocation
//! - [`pipeline`] - Ordering of the phases around the data copy
//! - [`testing`] - Mock implementations for testing

pub mod artifact;
pub mod config;
pub mod context;
pub mod dump;
pub mod error;
mod fsutil;
pub mod layout;
pub mod ledger;
pub mod manifest;
pub mod pipeline;
pub mod restore;
pub mod section;
pub mod testing;
pub mod tools;
pub mod uri;

// Re-export core types at crate root
pub use artifact::PhaseArtifact;
pub use config::{parse_bool, Config};
pub use context::{MigrationContext, RestoreOptions};
pub use dump::{dump_phase, dump_source_schema};
pub use error::{CopyError, Result};
pub use layout::WorkdirLayout;
pub use ledger::{FileLedger, Ledger};
pub use manifest::{build_filtered_manifest, write_manifest, ManifestLine, RestoreManifest};
pub use pipeline::{ledger_status, DataCopy, Pipeline, PipelineStatus, SchemaOnly, StepStatus};
pub use restore::{finalize_schema, prepare_schema, restore_phase};
pub use section::{DumpSection, Phase, Step};
pub use tools::{ArchiveEntry, PgPaths, PgTools, PgVersion, SchemaTools};
pub use uri::{scrub_uri, validate_connection_string};
