use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub const STATE_NOT_STARTED: &str = "not-started";
pub const STATE_RUNNING: &str = "running";
pub const STATE_SUCCESS: &str = "success";
pub const STATE_FAILED: &str = "failed";
pub const STATE_SKIPPED: &str = "skipped";

/// State of one phase of a sync run.
///
/// Transitions only go `NotStarted -> Running -> {Success, Failed, Skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseState {
    #[default]
    NotStarted,
    Running,
    Success,
    Failed,
    Skipped,
}

impl PhaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseState::NotStarted => STATE_NOT_STARTED,
            PhaseState::Running => STATE_RUNNING,
            PhaseState::Success => STATE_SUCCESS,
            PhaseState::Failed => STATE_FAILED,
            PhaseState::Skipped => STATE_SKIPPED,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            PhaseState::Success | PhaseState::Failed | PhaseState::Skipped
        )
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            STATE_NOT_STARTED => Ok(PhaseState::NotStarted),
            STATE_RUNNING => Ok(PhaseState::Running),
            STATE_SUCCESS => Ok(PhaseState::Success),
            STATE_FAILED => Ok(PhaseState::Failed),
            STATE_SKIPPED => Ok(PhaseState::Skipped),
            other => Err(format!("unknown phase state `{other}`")),
        }
    }
}

/// Index retrieval phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSection {
    pub state: PhaseState,
    /// Elapsed whole seconds, once the phase has finished.
    pub execution_time: Option<u64>,
    pub error_message: Option<String>,
    pub error: Option<String>,
    pub traceback: Option<String>,
}

/// Package import phase.
///
/// Counts stay `None` until the diff has been computed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagesSection {
    pub state: PhaseState,
    pub execution_time: Option<u64>,
    pub total_count: Option<u64>,
    pub finished_count: Option<u64>,
    pub error_count: Option<u64>,
    /// Identity key to formatted error text.
    pub individual_errors: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub removed_count: Option<u64>,
    #[serde(default)]
    pub removal_errors: Option<BTreeMap<String, String>>,
    pub error_message: Option<String>,
    pub error: Option<String>,
    pub traceback: Option<String>,
}

/// Publish phase. Carried through unchanged; nothing in a sync run drives it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishingSection {
    pub http: PhaseState,
    pub https: PhaseState,
}

/// Serializable snapshot of a sync run's progress, pushed to the sink on every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub index: IndexSection,
    pub packages: PackagesSection,
    pub publishing: PublishingSection,
}
