//! Core domain logic for workdeck.
//! This crate is the single source of truth for business invariants:
//! team/project/task hierarchy, role-consistent ownership transfer, and
//! event-driven notification fan-out.

pub mod blob;
pub mod cache;
pub mod db;
pub mod event;
pub mod logging;
pub mod model;
pub mod policy;
pub mod repo;
pub mod service;

pub use blob::{BlobError, BlobStore, FsBlobStore};
pub use cache::{Cache, MemoryCache};
pub use event::{DomainEvent, EventDispatcher, MailTemplate, Mailer, MailerError, NoopMailer};
pub use logging::{default_log_level, init_logging};
pub use model::content::{
    Attachment, AttachmentId, AttachmentParent, Comment, CommentId, CommentParent,
};
pub use model::notification::{
    Notification, NotificationId, NotificationKind, NotificationPayload,
};
pub use model::principal::{Principal, PrincipalId, RoleLabel};
pub use model::project::{
    NewProject, Project, ProjectId, ProjectStatus, UpdateProject, WorkerEdge, WorkerRole,
};
pub use model::task::{NewTask, Task, TaskId, TaskPriority, TaskStatus, UpdateTask};
pub use model::team::{Team, TeamId};
pub use policy::{Access, Actor};
pub use repo::attachment_repo::{AttachmentRepository, SqliteAttachmentRepository, StoredBlob};
pub use repo::comment_repo::{CommentRepository, SqliteCommentRepository};
pub use repo::directory_repo::{DirectoryRepository, SqliteDirectoryRepository};
pub use repo::notification_repo::{NotificationRepository, SqliteNotificationRepository};
pub use repo::project_repo::{ProjectRepository, SqliteProjectRepository};
pub use repo::task_repo::{SqliteTaskRepository, TaskRepository};
pub use repo::team_repo::{SqliteTeamRepository, TeamRepository};
pub use repo::{RepoError, RepoResult};
pub use service::attachment_service::{AttachmentService, Upload};
pub use service::comment_service::CommentService;
pub use service::notification_service::NotificationService;
pub use service::project_service::ProjectService;
pub use service::task_service::TaskService;
pub use service::team_service::{TeamService, UpdateTeam};
pub use service::{ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
