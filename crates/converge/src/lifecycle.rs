//! Lifecycle policies attached to a task's expected state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How to treat absence or divergence of the real object behind a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Create and update freely
    #[default]
    Sync,
    /// Never render the task
    Ignore,
    /// The object must already exist and match; divergence is fatal
    ExistsAndValidates,
    /// The object must already exist; divergence is reported and left alone
    ExistsAndWarnIfChanges,
}

impl Lifecycle {
    pub const ALL: [Self; 4] = [
        Self::Sync,
        Self::Ignore,
        Self::ExistsAndValidates,
        Self::ExistsAndWarnIfChanges,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "Sync",
            Self::Ignore => "Ignore",
            Self::ExistsAndValidates => "ExistsAndValidates",
            Self::ExistsAndWarnIfChanges => "ExistsAndWarnIfChanges",
        }
    }

    /// Whether the object must exist before the run (owned by another phase)
    pub fn requires_existing(&self) -> bool {
        matches!(self, Self::ExistsAndValidates | Self::ExistsAndWarnIfChanges)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown lifecycle name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lifecycle {0:?} (expected one of Sync, Ignore, ExistsAndValidates, ExistsAndWarnIfChanges)")]
pub struct ParseLifecycleError(String);

impl FromStr for Lifecycle {
    type Err = ParseLifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| ParseLifecycleError(s.to_string()))
    }
}
