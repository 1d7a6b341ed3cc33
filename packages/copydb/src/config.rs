use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

use crate::error::{CopyError, Result};
use crate::layout::WorkdirLayout;

/// Settings read from `PGCOPYDB_*` environment variables.
///
/// Command line flags take precedence; every field here is a fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub source_uri: Option<String>,
    pub target_uri: Option<String>,
    pub dir: Option<PathBuf>,
    pub snapshot: Option<String>,
    /// Directory holding pg_dump and pg_restore, instead of `PATH`
    pub pg_bindir: Option<PathBuf>,
    pub drop_if_exists: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let drop_if_exists = match get("PGCOPYDB_DROP_IF_EXISTS") {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                CopyError::Config(format!(
                    "PGCOPYDB_DROP_IF_EXISTS must be a boolean, got \"{value}\""
                ))
            })?,
            None => false,
        };

        Ok(Self {
            source_uri: get("PGCOPYDB_SOURCE_PGURI"),
            target_uri: get("PGCOPYDB_TARGET_PGURI"),
            dir: get("PGCOPYDB_DIR").map(PathBuf::from),
            snapshot: get("PGCOPYDB_SNAPSHOT"),
            pg_bindir: get("PGCOPYDB_PG_BINDIR").map(PathBuf::from),
            drop_if_exists,
        })
    }

    /// Working directory, falling back to `$TMPDIR/pgcopydb`.
    pub fn workdir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(WorkdirLayout::default_topdir)
    }
}

/// Postgres boolean grammar: on/off, true/false, yes/no, 1/0, and unique
/// prefixes of true/false/yes/no. Case-insensitive.
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim().to_ascii_lowercase();
    if value.is_empty() {
        return None;
    }
    let prefix_of = |word: &str| word.starts_with(value.as_str());

    match value.as_str() {
        "1" => Some(true),
        "0" => Some(false),
        "on" => Some(true),
        "of" | "off" => Some(false),
        _ if prefix_of("true") || prefix_of("yes") => Some(true),
        _ if prefix_of("false") || prefix_of("no") => Some(false),
        _ => None,
    }
}
