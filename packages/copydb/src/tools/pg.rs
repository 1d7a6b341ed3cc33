//! pg_dump / pg_restore backed implementation of [`SchemaTools`].

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::cmd::CmdBuilder;
use super::toc::{parse_listing, ArchiveEntry};
use super::SchemaTools;
use crate::context::RestoreOptions;
use crate::error::{CopyError, Result};
use crate::section::Phase;
use crate::uri::{extract_password, scrub_uri};

/// Postgres client version, e.g. "15.4" and 1504.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgVersion {
    pub text: String,
    /// major * 100 + minor
    pub number: u32,
}

impl PgVersion {
    /// Parse the output of `pg_dump --version`.
    ///
    /// Development builds report a bare major ("pg_dump (PostgreSQL) 17devel"),
    /// which counts as minor 0.
    pub fn parse(version_output: &str) -> Option<Self> {
        let re = Regex::new(r"([0-9]+(?:\.[0-9]+)*)").ok()?;
        let text = re.captures(version_output)?.get(1)?.as_str().to_string();

        let mut parts = text.split('.');
        let major: u32 = parts.next()?.parse().ok()?;
        let minor: u32 = match parts.next() {
            Some(m) => m.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            number: major * 100 + minor,
            text,
        })
    }
}

/// Where the Postgres client binaries live.
#[derive(Debug, Clone)]
pub struct PgPaths {
    pub pg_dump: PathBuf,
    pub pg_restore: PathBuf,
    pub version: Option<PgVersion>,
}

impl PgPaths {
    /// Look in `bin_dir` when given, otherwise on `PATH`.
    pub fn locate(bin_dir: Option<&Path>) -> Result<Self> {
        Ok(Self {
            pg_dump: find_tool(bin_dir, "pg_dump")?,
            pg_restore: find_tool(bin_dir, "pg_restore")?,
            version: None,
        })
    }

    /// Ask pg_dump for its version. An unreadable answer is logged, not fatal.
    pub async fn detect_version(mut self) -> Result<Self> {
        let output = CmdBuilder::new(&self.pg_dump)
            .arg("--version")
            .run_capture()
            .await?;
        let text = output.stdout_string();
        self.version = PgVersion::parse(&text);
        if self.version.is_none() {
            warn!(output = %text.trim(), "Failed to parse Postgres version number");
        }
        Ok(self)
    }
}

fn find_tool(bin_dir: Option<&Path>, tool: &str) -> Result<PathBuf> {
    let not_found = || CopyError::ToolNotFound {
        tool: tool.to_string(),
    };
    match bin_dir {
        Some(dir) => {
            let candidate = dir.join(tool);
            if candidate.is_file() {
                Ok(candidate)
            } else {
                Err(not_found())
            }
        }
        None => which::which(tool).map_err(|_| not_found()),
    }
}

/// Runs the real Postgres client tools.
#[derive(Debug, Clone)]
pub struct PgTools {
    paths: PgPaths,
}

impl PgTools {
    pub fn new(paths: PgPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &PgPaths {
        &self.paths
    }

    /// Connection goes last on the command line, password through the environment.
    fn with_connection(cmd: CmdBuilder, pguri: &str) -> CmdBuilder {
        let safe = extract_password(pguri);
        let mut cmd = cmd.arg("--dbname").secret_arg(&safe.pguri, scrub_uri(pguri));
        if let Some(password) = safe.password {
            cmd = cmd.env("PGPASSWORD", password);
        }
        cmd
    }
}

#[async_trait]
impl SchemaTools for PgTools {
    async fn dump(
        &self,
        source: &str,
        snapshot: Option<&str>,
        phase: Phase,
        output: &Path,
    ) -> Result<()> {
        let mut cmd = CmdBuilder::new(&self.paths.pg_dump)
            .args(["-Fc", "--section", phase.as_str(), "--file"])
            .arg(output);
        if let Some(snapshot) = snapshot {
            cmd = cmd.args(["--snapshot", snapshot]);
        }
        Self::with_connection(cmd, source).run_capture().await?;
        Ok(())
    }

    async fn restore(
        &self,
        target: &str,
        artifact: &Path,
        manifest: Option<&Path>,
        options: &RestoreOptions,
    ) -> Result<()> {
        let mut cmd = Self::with_connection(CmdBuilder::new(&self.paths.pg_restore), target)
            .args(options.to_args());
        if let Some(list) = manifest {
            cmd = cmd.arg("--use-list").arg(list);
        }
        cmd.arg(artifact).run_capture().await?;
        Ok(())
    }

    async fn list_contents(&self, artifact: &Path) -> Result<Vec<ArchiveEntry>> {
        let output = CmdBuilder::new(&self.paths.pg_restore)
            .arg("--list")
            .arg(artifact)
            .run_capture()
            .await?;
        parse_listing(&output.stdout_string())
    }
}
