//! Version and job status enums.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`.
//! `JobStatus` provides `allowed_next_states()` so transitions are enforced at
//! the application layer rather than trusted to callers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// VersionFamily
// ---------------------------------------------------------------------------

/// Major SEI family. Families are mutually incompatible dialects: different
/// login flows, different markup, different pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VersionFamily {
    V2,
    V4,
    V5,
}

impl VersionFamily {
    /// String form used in config files and failure reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V2 => "v2",
            Self::V4 => "v4",
            Self::V5 => "v5",
        }
    }

    /// The numeric major version.
    #[must_use]
    pub const fn major(self) -> u8 {
        match self {
            Self::V2 => 2,
            Self::V4 => 4,
            Self::V5 => 5,
        }
    }
}

impl fmt::Display for VersionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v2" | "2" => Ok(Self::V2),
            "v4" | "4" => Ok(Self::V4),
            "v5" | "5" => Ok(Self::V5),
            other => Err(format!("unknown SEI version family: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// SeiVersion
// ---------------------------------------------------------------------------

/// A concrete (family, minor) pair, e.g. `4.2`.
///
/// Parsed from the `"major.minor"` strings institutions declare in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct SeiVersion {
    pub family: VersionFamily,
    pub minor: u8,
}

impl SeiVersion {
    #[must_use]
    pub const fn new(family: VersionFamily, minor: u8) -> Self {
        Self { family, minor }
    }
}

impl fmt::Display for SeiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.family.major(), self.minor)
    }
}

impl FromStr for SeiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| format!("expected \"major.minor\", got: {s}"))?;
        let family = major.parse::<VersionFamily>()?;
        let minor = minor
            .parse::<u8>()
            .map_err(|_| format!("invalid minor version: {minor}"))?;
        Ok(Self { family, minor })
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Status of a scrape job through its lifecycle.
///
/// ```text
/// pending → running → succeeded
///                   → failed
///                   → retrying → running
///                              → failed
/// ```
///
/// Transitions are monotonic: terminal states have no successors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Valid next states from the current state.
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Running, Self::Failed],
            Self::Running => &[Self::Succeeded, Self::Retrying, Self::Failed],
            Self::Retrying => &[Self::Running, Self::Failed],
            Self::Succeeded | Self::Failed => &[],
        }
    }

    /// Whether the status can transition to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    /// Terminal states never transition again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// String form used in logs and failure reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
