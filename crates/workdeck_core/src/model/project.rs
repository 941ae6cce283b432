//! Project model and per-edge worker roles.
//!
//! # Invariants
//! - A project with at least one worker has exactly one `project_manager`
//!   edge.
//! - The creator is the manager by default.

use crate::model::principal::PrincipalId;
use crate::model::team::TeamId;
use crate::model::text::display_name;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a project.
pub type ProjectId = Uuid;

/// Role attribute on one project↔principal worker edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    ProjectManager,
    Member,
}

impl WorkerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProjectManager => "project_manager",
            Self::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "project_manager" => Some(Self::ProjectManager),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// Project lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Completed,
    Overdue,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

/// Project read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub team_id: TeamId,
    /// Stored lowercase; use [`Project::display_name`] for rendering.
    pub name: String,
    /// Sanitized on write (markup stripped).
    pub description: String,
    pub status: ProjectStatus,
    /// Epoch ms deadline, if any.
    pub due_date_ms: Option<i64>,
    pub created_by: PrincipalId,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Project {
    /// User-facing rendering of the stored name.
    pub fn display_name(&self) -> String {
        display_name(&self.name)
    }

    /// Whether the project is past its deadline and not completed.
    pub fn is_overdue(&self, now_ms: i64) -> bool {
        self.status != ProjectStatus::Completed
            && self.due_date_ms.is_some_and(|due| due < now_ms)
    }
}

/// One worker edge of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerEdge {
    pub principal_id: PrincipalId,
    pub role: WorkerRole,
}

/// Request model for creating a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub team_id: TeamId,
    pub name: String,
    pub description: String,
    /// Epoch ms deadline, if any.
    pub due_date_ms: Option<i64>,
    /// Initial workers besides the creator; all get `member` edges.
    pub worker_ids: Vec<PrincipalId>,
}

/// Partial update for a project. `None` fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub due_date_ms: Option<i64>,
}
