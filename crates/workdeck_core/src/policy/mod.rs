//! Authorization evaluator.
//!
//! # Responsibility
//! - Answer "can principal P perform action A on entity E" from loaded
//!   facts, composing global role labels with per-edge roles.
//! - Carry a caller-facing reason on every deny.
//!
//! # Invariants
//! - Evaluation is pure: no storage access, first matching rule wins.
//! - Actions and roles are closed enumerations; there are no dynamic
//!   permission strings.

use crate::model::content::Comment;
use crate::model::notification::Notification;
use crate::model::principal::{PrincipalId, RoleLabel};
use crate::model::project::{Project, WorkerRole};
use crate::model::task::Task;
use crate::model::team::Team;
use std::collections::BTreeSet;

/// The acting principal with its global role labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: PrincipalId,
    pub labels: BTreeSet<RoleLabel>,
}

impl Actor {
    pub fn new(id: PrincipalId, labels: BTreeSet<RoleLabel>) -> Self {
        Self { id, labels }
    }

    pub fn has(&self, label: RoleLabel) -> bool {
        self.labels.contains(&label)
    }

    pub fn is_admin(&self) -> bool {
        self.has(RoleLabel::Admin)
    }
}

/// Evaluation outcome. Every deny carries a human-readable reason which is
/// part of the contract surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(String),
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    fn deny(reason: &str) -> Self {
        Self::Deny(reason.to_string())
    }
}

/// Actions on a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamAction {
    View,
    Update,
    Delete,
    AddMembers,
    RemoveMembers,
    TransferOwnership,
}

/// Actions on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectAction {
    View,
    Update,
    Delete,
    ChangeManager,
    AddWorkers,
    RemoveWorkers,
    Comment,
    Attach,
}

/// Actions on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    View,
    Update,
    Delete,
    Assign,
    Comment,
    Attach,
}

/// Actions on a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentAction {
    View,
    Update,
    Delete,
    Attach,
}

/// Actions on an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentAction {
    Create,
    View,
    Update,
    Delete,
}

/// Actions on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    View,
    Delete,
    MarkRead,
}

/// Edge facts needed to evaluate project rules for one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFacts {
    /// Owner of the project's parent team.
    pub team_owner: PrincipalId,
    /// The actor's worker-edge role on this project, if any.
    pub actor_role: Option<WorkerRole>,
}

/// Edge facts needed to evaluate task rules for one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFacts {
    /// The actor's worker-edge role on the parent project, if any.
    pub actor_role: Option<WorkerRole>,
}

/// Resolved parent of a comment, loaded with actor-specific facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentParentSnapshot {
    Project { project: Project, facts: ProjectFacts },
    Task { task: Task, facts: TaskFacts },
}

/// Resolved parent of an attachment, loaded with actor-specific facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentParentSnapshot {
    Project { project: Project, facts: ProjectFacts },
    Task { task: Task, facts: TaskFacts },
    Comment { comment: Comment },
}

/// Evaluates one action against a team.
pub fn team_access(actor: &Actor, action: TeamAction, team: &Team) -> Access {
    if actor.is_admin() {
        return Access::Allow;
    }
    // The current owner may always hand the team over, label or not.
    if action == TeamAction::TransferOwnership && actor.id == team.owner_id {
        return Access::Allow;
    }
    if actor.has(RoleLabel::TeamOwner) && actor.id == team.owner_id {
        return Access::Allow;
    }

    Access::deny(match action {
        TeamAction::View => "You do not have the permissions to show this team.",
        TeamAction::Update => "You do not have the permissions to update this team.",
        TeamAction::Delete => {
            "You do not have the permissions to delete a team that you do not own."
        }
        TeamAction::AddMembers => "You do not have the permissions to add members to this team.",
        TeamAction::RemoveMembers => {
            "You do not have the permissions to remove members from this team."
        }
        TeamAction::TransferOwnership => {
            "You do not have the permissions to transfer team ownership."
        }
    })
}

/// Evaluates one action against a project.
pub fn project_access(actor: &Actor, action: ProjectAction, facts: &ProjectFacts) -> Access {
    if actor.is_admin() {
        return Access::Allow;
    }

    let owns_parent_team = actor.has(RoleLabel::TeamOwner) && actor.id == facts.team_owner;
    let manages_project = actor.has(RoleLabel::ProjectManager)
        && facts.actor_role == Some(WorkerRole::ProjectManager);

    let allowed = match action {
        ProjectAction::View
        | ProjectAction::Update
        | ProjectAction::Delete
        | ProjectAction::AddWorkers
        | ProjectAction::RemoveWorkers => owns_parent_team || manages_project,
        ProjectAction::ChangeManager => owns_parent_team,
        ProjectAction::Comment | ProjectAction::Attach => {
            owns_parent_team || facts.actor_role.is_some()
        }
    };
    if allowed {
        return Access::Allow;
    }

    Access::deny(match action {
        ProjectAction::View => "You don't have permission to show this project.",
        ProjectAction::Update => "You do not have the permissions to update this project.",
        ProjectAction::Delete => "You do not have the permissions to delete this project.",
        ProjectAction::ChangeManager => {
            "You do not have the permissions to change project manager for this project."
        }
        ProjectAction::AddWorkers => {
            "You do not have the permissions to add workers to this project."
        }
        ProjectAction::RemoveWorkers => {
            "You do not have the permissions to remove workers from this project."
        }
        ProjectAction::Comment => "You do not have the permissions to comment at this project.",
        ProjectAction::Attach => {
            "You do not have the permissions to add attachments to this project."
        }
    })
}

/// Evaluates one action against a task.
///
/// View/update/delete have no admin bypass: only the parent project's
/// manager and the assignee act on a task directly.
pub fn task_access(actor: &Actor, action: TaskAction, task: &Task, facts: &TaskFacts) -> Access {
    let manages_project = facts.actor_role == Some(WorkerRole::ProjectManager);
    let is_assignee = actor.id == task.assignee_id;

    let allowed = match action {
        TaskAction::View | TaskAction::Update | TaskAction::Delete => {
            manages_project || is_assignee
        }
        TaskAction::Assign | TaskAction::Comment | TaskAction::Attach => {
            actor.is_admin() || manages_project || is_assignee
        }
    };
    if allowed {
        return Access::Allow;
    }

    Access::deny(match action {
        TaskAction::View => "You do not have the permissions to show this task.",
        TaskAction::Update => "You do not have the permissions to update this task.",
        TaskAction::Delete => "You do not have the permissions to delete this task.",
        TaskAction::Assign => "You do not have the permissions to assign a task.",
        TaskAction::Comment => "You do not have the permissions to comment at this task.",
        TaskAction::Attach => "You do not have the permissions to add attachments to this task.",
    })
}

/// Evaluates one action against a comment, delegating view/delete to the
/// parent entity's comment rule.
pub fn comment_access(
    actor: &Actor,
    action: CommentAction,
    comment: &Comment,
    parent: &CommentParentSnapshot,
) -> Access {
    match action {
        CommentAction::Update => {
            if actor.id == comment.author_id {
                Access::Allow
            } else {
                Access::deny("You do not have the permissions to update this comment.")
            }
        }
        CommentAction::Attach => {
            if actor.is_admin() || actor.id == comment.author_id {
                Access::Allow
            } else {
                Access::deny("You do not have the permissions to add attachments to this comment.")
            }
        }
        CommentAction::View | CommentAction::Delete => match parent {
            CommentParentSnapshot::Project { facts, .. } => {
                project_access(actor, ProjectAction::Comment, facts)
            }
            CommentParentSnapshot::Task { task, facts } => {
                task_access(actor, TaskAction::Comment, task, facts)
            }
        },
    }
}

/// Evaluates one action against an existing attachment by delegating to
/// the parent entity's attachment rule.
pub fn attachment_access(
    actor: &Actor,
    _action: AttachmentAction,
    parent: &AttachmentParentSnapshot,
) -> Access {
    match parent {
        AttachmentParentSnapshot::Project { facts, .. } => {
            project_access(actor, ProjectAction::Attach, facts)
        }
        AttachmentParentSnapshot::Task { task, facts } => {
            task_access(actor, TaskAction::Attach, task, facts)
        }
        AttachmentParentSnapshot::Comment { comment } => {
            if actor.is_admin() || actor.id == comment.author_id {
                Access::Allow
            } else {
                Access::deny("You do not have the permissions to add attachments to this comment.")
            }
        }
    }
}

/// Evaluates one action against a notification.
pub fn notification_access(
    actor: &Actor,
    action: NotificationAction,
    notification: &Notification,
) -> Access {
    if actor.is_admin() || actor.id == notification.recipient_id {
        return Access::Allow;
    }
    Access::deny(match action {
        NotificationAction::View => {
            "You do not have the permissions to show this notification."
        }
        NotificationAction::Delete => {
            "You do not have the permissions to delete this notification."
        }
        NotificationAction::MarkRead => {
            "You do not have permissions to mark this notification as read."
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::project::ProjectStatus;
    use crate::model::task::{TaskPriority, TaskStatus};
    use uuid::Uuid;

    fn actor_with(labels: &[RoleLabel]) -> Actor {
        Actor::new(Uuid::new_v4(), labels.iter().copied().collect())
    }

    fn team_owned_by(owner: PrincipalId) -> Team {
        Team {
            id: Uuid::new_v4(),
            name: "crew".to_string(),
            owner_id: owner,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn sample_task(assignee: PrincipalId) -> Task {
        Task {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "ship it".to_string(),
            description: String::new(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            due_date_ms: None,
            assignee_id: assignee,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn sample_project(team_id: Uuid, creator: PrincipalId) -> Project {
        Project {
            id: Uuid::new_v4(),
            team_id,
            name: "deck".to_string(),
            description: String::new(),
            status: ProjectStatus::Active,
            due_date_ms: None,
            created_by: creator,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn admin_bypasses_team_rules() {
        let admin = actor_with(&[RoleLabel::Admin]);
        let team = team_owned_by(Uuid::new_v4());
        assert!(team_access(&admin, TeamAction::Delete, &team).is_allowed());
    }

    #[test]
    fn owner_without_label_can_still_transfer() {
        let owner = actor_with(&[]);
        let team = team_owned_by(owner.id);
        assert!(team_access(&owner, TeamAction::TransferOwnership, &team).is_allowed());
        assert!(!team_access(&owner, TeamAction::Update, &team).is_allowed());
    }

    #[test]
    fn task_view_is_manager_or_assignee_only() {
        let manager = actor_with(&[RoleLabel::ProjectManager]);
        let task = sample_task(Uuid::new_v4());
        let manager_facts = TaskFacts {
            actor_role: Some(WorkerRole::ProjectManager),
        };
        assert!(task_access(&manager, TaskAction::View, &task, &manager_facts).is_allowed());

        let assignee = actor_with(&[RoleLabel::Member]);
        let own_task = sample_task(assignee.id);
        let assignee_facts = TaskFacts {
            actor_role: Some(WorkerRole::Member),
        };
        assert!(task_access(&assignee, TaskAction::View, &own_task, &assignee_facts).is_allowed());

        // Admin label alone does not grant task view.
        let admin = actor_with(&[RoleLabel::Admin]);
        let admin_facts = TaskFacts { actor_role: None };
        let access = task_access(&admin, TaskAction::View, &task, &admin_facts);
        assert!(matches!(access, Access::Deny(_)));
    }

    #[test]
    fn admin_may_assign_but_not_update() {
        let admin = actor_with(&[RoleLabel::Admin]);
        let task = sample_task(Uuid::new_v4());
        let facts = TaskFacts { actor_role: None };
        assert!(task_access(&admin, TaskAction::Assign, &task, &facts).is_allowed());
        assert!(!task_access(&admin, TaskAction::Update, &task, &facts).is_allowed());
    }

    #[test]
    fn any_worker_may_comment_on_project() {
        let worker = actor_with(&[RoleLabel::Member]);
        let facts = ProjectFacts {
            team_owner: Uuid::new_v4(),
            actor_role: Some(WorkerRole::Member),
        };
        assert!(project_access(&worker, ProjectAction::Comment, &facts).is_allowed());
        let access = project_access(&worker, ProjectAction::Update, &facts);
        assert!(matches!(access, Access::Deny(_)));
    }

    #[test]
    fn deny_reason_is_surfaced() {
        let stranger = actor_with(&[]);
        let team = team_owned_by(Uuid::new_v4());
        match team_access(&stranger, TeamAction::AddMembers, &team) {
            Access::Deny(reason) => assert!(reason.contains("add members")),
            Access::Allow => panic!("stranger must not add members"),
        }
    }

    #[test]
    fn comment_update_is_author_only() {
        let author = actor_with(&[RoleLabel::Member]);
        let comment = Comment {
            id: Uuid::new_v4(),
            parent: crate::model::content::CommentParent::Project(Uuid::new_v4()),
            author_id: author.id,
            body: "looks good".to_string(),
            created_at: 0,
            updated_at: 0,
        };
        let project = sample_project(Uuid::new_v4(), Uuid::new_v4());
        let parent = CommentParentSnapshot::Project {
            project,
            facts: ProjectFacts {
                team_owner: Uuid::new_v4(),
                actor_role: Some(WorkerRole::Member),
            },
        };
        assert!(comment_access(&author, CommentAction::Update, &comment, &parent).is_allowed());

        let other = actor_with(&[RoleLabel::Admin]);
        let access = comment_access(&other, CommentAction::Update, &comment, &parent);
        assert!(matches!(access, Access::Deny(_)));
    }

    #[test]
    fn notification_is_private_to_recipient_and_admin() {
        let recipient = actor_with(&[]);
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id: recipient.id,
            kind: crate::model::notification::NotificationKind::CommentCreated,
            payload: crate::model::notification::NotificationPayload {
                entity_kind: "task".to_string(),
                entity_id: Uuid::new_v4(),
                name: "ship it".to_string(),
                deadline_ms: None,
                parent_name: "deck".to_string(),
            },
            read_at: None,
            created_at: 0,
        };
        assert!(
            notification_access(&recipient, NotificationAction::MarkRead, &notification)
                .is_allowed()
        );
        let stranger = actor_with(&[RoleLabel::TeamOwner]);
        let access = notification_access(&stranger, NotificationAction::View, &notification);
        assert!(matches!(access, Access::Deny(_)));
    }
}
