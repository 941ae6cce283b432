//! Notification model.
//!
//! # Invariants
//! - One row per (event, recipient) pair.
//! - Created once; mutated only by mark-read; deleted explicitly.

use crate::model::principal::PrincipalId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a notification.
pub type NotificationId = Uuid;

/// Notification type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    CommentCreated,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskAssigned => "task_assigned",
            Self::CommentCreated => "comment_created",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "task_assigned" => Some(Self::TaskAssigned),
            "comment_created" => Some(Self::CommentCreated),
            _ => None,
        }
    }
}

/// Structured payload carried by every notification, stored as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Kind of the entity the event happened on (`project` or `task`).
    pub entity_kind: String,
    pub entity_id: Uuid,
    /// Display name of the entity.
    pub name: String,
    /// Epoch ms deadline of the entity, if any.
    pub deadline_ms: Option<i64>,
    /// Display name of the entity's parent (project name for a task,
    /// team name for a project).
    pub parent_name: String,
}

/// Notification read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: PrincipalId,
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
    /// Epoch ms read timestamp; `None` means unread.
    pub read_at: Option<i64>,
    pub created_at: i64,
}

impl Notification {
    /// Whether the recipient has not read this notification yet.
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}
