//! Comments and attachments with tagged-union parents.
//!
//! # Responsibility
//! - Model the polymorphic "belongs to project/task/comment" association as
//!   closed enums instead of open type inspection.
//!
//! # Invariants
//! - A comment's parent is a project or a task, never another comment.
//! - Content lifecycle is tied to the parent (parent delete cascades).

use crate::model::principal::PrincipalId;
use crate::model::project::ProjectId;
use crate::model::task::TaskId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a comment.
pub type CommentId = Uuid;
/// Stable identifier for an attachment.
pub type AttachmentId = Uuid;

/// Parent of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CommentParent {
    Project(ProjectId),
    Task(TaskId),
}

impl CommentParent {
    /// Stable string id for the parent kind column.
    pub fn kind_str(self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::Task(_) => "task",
        }
    }

    /// The parent row id.
    pub fn id(self) -> Uuid {
        match self {
            Self::Project(id) | Self::Task(id) => id,
        }
    }
}

/// Parent of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AttachmentParent {
    Project(ProjectId),
    Task(TaskId),
    Comment(CommentId),
}

impl AttachmentParent {
    /// Stable string id for the parent kind column.
    pub fn kind_str(self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::Task(_) => "task",
            Self::Comment(_) => "comment",
        }
    }

    /// The parent row id.
    pub fn id(self) -> Uuid {
        match self {
            Self::Project(id) | Self::Task(id) | Self::Comment(id) => id,
        }
    }
}

/// Comment read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub parent: CommentParent,
    pub author_id: PrincipalId,
    /// Sanitized on write (markup stripped).
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Attachment read model. The blob itself lives in the blob store under
/// `path`; the core only keeps size/mime metadata supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub parent: AttachmentParent,
    pub path: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub created_at: i64,
}
