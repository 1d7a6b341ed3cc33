//! Command builder for running the Postgres client tools

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::{CopyError, Result};

/// Fluent builder for running an external tool to completion
#[derive(Debug, Default)]
pub struct CmdBuilder {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(String, String)>,
    /// Printed instead of the real arguments (connection strings hold secrets)
    display_args: Vec<String>,
}

impl CmdBuilder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        let arg = arg.as_ref();
        self.display_args.push(arg.to_string_lossy().into_owned());
        self.args.push(arg.to_os_string());
        self
    }

    /// Add an argument that is shown as `shown` in logs.
    pub fn secret_arg(mut self, arg: impl AsRef<OsStr>, shown: impl Into<String>) -> Self {
        self.display_args.push(shown.into());
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Command line as it may appear in logs.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.display_args.iter().cloned());
        parts.join(" ")
    }

    /// Run to completion, capturing output. A non-zero exit is an error.
    pub async fn run_capture(&self) -> Result<CmdOutput> {
        let tool = self.tool_name();
        debug!(command = %self.display(), "Running");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        // Never wait on an interactive password prompt
        cmd.stdin(Stdio::null());

        let output = cmd
            .output()
            .await
            .map_err(|source| CopyError::ToolSpawn {
                tool: tool.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(CopyError::ToolFailed {
                tool,
                code: output.status.code(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            debug!(tool = %tool, stderr = %stderr, "Tool reported on stderr");
        }

        Ok(CmdOutput {
            stdout: output.stdout,
        })
    }
}

/// Output from a successful captured command execution
pub struct CmdOutput {
    pub stdout: Vec<u8>,
}

impl CmdOutput {
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_hides_secret_args() {
        let cmd = CmdBuilder::new("/usr/bin/pg_dump")
            .args(["-Fc", "--section", "pre-data"])
            .secret_arg("postgres://app:hunter2@db/shop", "postgres://app:****@db/shop");

        let shown = cmd.display();
        assert_eq!(
            shown,
            "/usr/bin/pg_dump -Fc --section pre-data postgres://app:****@db/shop"
        );
        assert_eq!(cmd.tool_name(), "pg_dump");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_tool_failure() {
        let err = CmdBuilder::new("sh")
            .args(["-c", "echo boom >&2; exit 3"])
            .run_capture()
            .await
            .err()
            .unwrap();

        match err {
            CopyError::ToolFailed { tool, code, stderr } => {
                assert_eq!(tool, "sh");
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() {
        let err = CmdBuilder::new("/nonexistent/pg_restore")
            .run_capture()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CopyError::ToolSpawn { .. }));
    }
}
