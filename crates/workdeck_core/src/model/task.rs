//! Task model.
//!
//! # Invariants
//! - A task always has exactly one assignee.
//! - The assignee must be a worker of the parent project at assignment time.

use crate::model::principal::PrincipalId;
use crate::model::project::ProjectId;
use crate::model::text::display_name;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a task.
pub type TaskId = Uuid;

/// Task lifecycle state. New tasks default to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Overdue,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Task read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    /// Stored lowercase; use [`Task::display_name`] for rendering.
    pub name: String,
    /// Sanitized on write (markup stripped).
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Epoch ms deadline, if any.
    pub due_date_ms: Option<i64>,
    pub assignee_id: PrincipalId,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Request model for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    /// Defaults to `Pending` when absent.
    pub status: Option<TaskStatus>,
    /// Defaults to `Medium` when absent.
    pub priority: Option<TaskPriority>,
    /// Epoch ms deadline, if any.
    pub due_date_ms: Option<i64>,
    pub assignee_id: PrincipalId,
}

/// Partial update for a task. `None` fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateTask {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date_ms: Option<i64>,
}

impl Task {
    /// User-facing rendering of the stored name.
    pub fn display_name(&self) -> String {
        display_name(&self.name)
    }

    /// Whether the task is past its deadline and neither completed nor
    /// already swept.
    pub fn is_overdue(&self, now_ms: i64) -> bool {
        !matches!(self.status, TaskStatus::Completed | TaskStatus::Overdue)
            && self.due_date_ms.is_some_and(|due| due < now_ms)
    }
}
