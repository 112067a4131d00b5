use std::time::Duration;

use serde::{Deserialize, Serialize};

// --- Enums ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BeadType {
    #[default]
    Task,
    Bug,
    Feature,
    Epic,
    Chore,
}

impl BeadType {
    /// Feature and epic beads fan out over their open children as a campaign;
    /// everything else dispatches as a single pipeline.
    pub fn is_campaign_parent(&self) -> bool {
        matches!(self, BeadType::Feature | BeadType::Epic)
    }
}

impl std::fmt::Display for BeadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BeadType::Task => write!(f, "task"),
            BeadType::Bug => write!(f, "bug"),
            BeadType::Feature => write!(f, "feature"),
            BeadType::Epic => write!(f, "epic"),
            BeadType::Chore => write!(f, "chore"),
        }
    }
}

pub fn parse_bead_type(s: &str) -> BeadType {
    match s.to_lowercase().as_str() {
        "bug" => BeadType::Bug,
        "feature" => BeadType::Feature,
        "epic" => BeadType::Epic,
        "chore" => BeadType::Chore,
        _ => BeadType::Task,
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Running,
    Passed,
    Failed,
    Error,
    Skipped,
}

impl PhaseStatus {
    /// A terminal status produces a stored report and never reverts on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhaseStatus::Passed | PhaseStatus::Failed | PhaseStatus::Error
        )
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseStatus::Pending => write!(f, "pending"),
            PhaseStatus::Running => write!(f, "running"),
            PhaseStatus::Passed => write!(f, "passed"),
            PhaseStatus::Failed => write!(f, "failed"),
            PhaseStatus::Error => write!(f, "error"),
            PhaseStatus::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CampaignTaskStatus {
    #[default]
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

// --- Bead structs ---

/// A unit of work with a dotted hierarchical id. Identity is `id`: two
/// summaries with the same id are the same bead.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct BeadSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub priority: u8,
    #[serde(default, rename = "issue_type")]
    pub bead_type: BeadType,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct BeadDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub priority: u8,
    #[serde(default, rename = "issue_type")]
    pub bead_type: BeadType,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_title: Option<String>,
}

// --- Phase structs ---

/// Current visible state of one phase in the pipeline pane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseEntry {
    pub name: String,
    pub status: PhaseStatus,
    pub attempt: u32,
    pub max_retry: u32,
    pub duration: Duration,
}

impl PhaseEntry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: PhaseStatus::Pending,
            attempt: 0,
            max_retry: 0,
            duration: Duration::ZERO,
        }
    }
}

/// Status event streamed by a pipeline runner. Zero-valued `attempt`,
/// `max_retry`, and `duration` mean "no information" and never overwrite
/// an existing value.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PhaseUpdate {
    pub phase: String,
    pub status: PhaseStatus,
    pub attempt: u32,
    pub max_retry: u32,
    pub duration: Duration,
    pub summary: String,
    pub feedback: String,
    pub files_changed: Vec<String>,
}

/// Stored terminal state of a phase, used to render the report pane after
/// completion. At most one report exists per phase name; a later terminal
/// transition for the same name replaces the earlier one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase_name: String,
    pub status: PhaseStatus,
    pub summary: String,
    pub feedback: String,
    pub files_changed: Vec<String>,
    pub duration: Duration,
}

impl PhaseReport {
    pub fn from_update(update: &PhaseUpdate) -> Self {
        Self {
            phase_name: update.phase.clone(),
            status: update.status,
            summary: update.summary.clone(),
            feedback: update.feedback.clone(),
            files_changed: update.files_changed.clone(),
            duration: update.duration,
        }
    }
}

// --- Dispatch structs ---

/// Everything a pipeline runner needs to execute one bead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineInput {
    pub bead_id: String,
    pub bead_title: String,
    pub bead_type: BeadType,
    pub provider: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PipelineOutput {
    pub bead_id: String,
    pub success: bool,
    pub summary: Option<String>,
    /// Terminal reports per phase, in phase order. Campaigns carry these
    /// into `CampaignTaskDone` so completed tasks stay inspectable.
    pub reports: Vec<PhaseReport>,
}

/// Everything a campaign runner needs: the parent bead and the open direct
/// children enumerated at dispatch time, so queue indices agree between the
/// runner and the dashboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CampaignInput {
    pub parent_id: String,
    pub parent_title: String,
    pub provider: String,
    pub tasks: Vec<CampaignTaskInfo>,
}

/// One entry in a campaign's task queue: an open direct child of the parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CampaignTaskInfo {
    pub id: String,
    pub title: String,
}

/// Terminal accounting for a campaign run.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CampaignOutcome {
    pub completed: u32,
    pub failed: u32,
}
