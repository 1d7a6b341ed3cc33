//! Dump sections, schema phases and the four tracked pipeline steps.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::CopyError;

/// What a dump request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpSection {
    /// Both schema phases, the same as `All` for a schema-only copy
    Schema,
    PreData,
    PostData,
    All,
}

impl DumpSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::PreData => "pre-data",
            Self::PostData => "post-data",
            Self::All => "all",
        }
    }

    /// Phases this section expands to, in dump order.
    pub fn phases(&self) -> &'static [Phase] {
        match self {
            Self::Schema | Self::All => &[Phase::PreData, Phase::PostData],
            Self::PreData => &[Phase::PreData],
            Self::PostData => &[Phase::PostData],
        }
    }
}

impl fmt::Display for DumpSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DumpSection {
    type Err = CopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schema" => Ok(Self::Schema),
            "pre-data" => Ok(Self::PreData),
            "post-data" => Ok(Self::PostData),
            "all" => Ok(Self::All),
            other => Err(CopyError::Config(format!("unknown dump section: {other}"))),
        }
    }
}

/// One of the two ordered schema sub-dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Objects with no data dependency (tables, types, functions)
    PreData,
    /// Objects that need the data in place (indexes, constraints, triggers)
    PostData,
}

impl Phase {
    /// Value passed to `pg_dump --section`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreData => "pre-data",
            Self::PostData => "post-data",
        }
    }

    pub fn dump_step(&self) -> Step {
        match self {
            Self::PreData => Step::PreDump,
            Self::PostData => Step::PostDump,
        }
    }

    pub fn restore_step(&self) -> Step {
        match self {
            Self::PreData => Step::PreRestore,
            Self::PostData => Step::PostRestore,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase operation guarded by a completion marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    PreDump,
    PostDump,
    PreRestore,
    PostRestore,
}

impl Step {
    /// All steps in pipeline order.
    pub const ALL: [Step; 4] = [
        Step::PreDump,
        Step::PreRestore,
        Step::PostDump,
        Step::PostRestore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreDump => "dump-pre",
            Self::PostDump => "dump-post",
            Self::PreRestore => "restore-pre",
            Self::PostRestore => "restore-post",
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::PreDump | Self::PreRestore => Phase::PreData,
            Self::PostDump | Self::PostRestore => Phase::PostData,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_and_all_expand_to_both_phases() {
        assert_eq!(
            DumpSection::Schema.phases(),
            &[Phase::PreData, Phase::PostData]
        );
        assert_eq!(DumpSection::All.phases(), DumpSection::Schema.phases());
        assert_eq!(DumpSection::PreData.phases(), &[Phase::PreData]);
        assert_eq!(DumpSection::PostData.phases(), &[Phase::PostData]);
    }

    #[test]
    fn test_section_from_str() {
        assert_eq!(
            "post-data".parse::<DumpSection>().unwrap(),
            DumpSection::PostData
        );
        assert!("data".parse::<DumpSection>().is_err());
    }

    #[test]
    fn test_step_phase_mapping() {
        for phase in [Phase::PreData, Phase::PostData] {
            assert_eq!(phase.dump_step().phase(), phase);
            assert_eq!(phase.restore_step().phase(), phase);
        }
    }
}
