//! Domain events and notification fan-out.
//!
//! # Responsibility
//! - Define the typed events mutating services hand back to their caller.
//! - Compute recipient sets from the membership graph and create one
//!   notification + one outbound message per recipient.
//!
//! # Invariants
//! - Dispatch runs after the triggering transaction committed; it reads
//!   graph state as of dispatch time and never re-runs retroactively.
//! - Notification creation precedes outbound scheduling for the same
//!   recipient; the scheduled message carries the created notification.
//! - Mailer failures are logged and isolated; they never fail dispatch.
//! - Dispatch has no idempotency key: re-dispatching the same event
//!   creates duplicate notifications.

use crate::model::content::{CommentId, CommentParent};
use crate::model::notification::{
    Notification, NotificationId, NotificationKind, NotificationPayload,
};
use crate::model::principal::PrincipalId;
use crate::model::task::TaskId;
use crate::repo::comment_repo::load_required_comment;
use crate::repo::directory_repo::load_required_principal;
use crate::repo::notification_repo::{NotificationRepository, SqliteNotificationRepository};
use crate::repo::project_repo::{load_required_project, project_worker_ids, team_owner_id};
use crate::repo::task_repo::load_required_task;
use crate::repo::team_repo::load_required_team;
use crate::repo::RepoResult;
use log::{error, info};
use rusqlite::Connection;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Typed domain event returned by mutating operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainEvent {
    TaskAssigned { task_id: TaskId },
    CommentCreated { comment_id: CommentId },
}

/// Outbound message template selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTemplate {
    TaskAssigned,
    CommentCreated,
}

impl MailTemplate {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskAssigned => "task_assigned",
            Self::CommentCreated => "comment_created",
        }
    }
}

/// Failure reported by an outbound messaging collaborator.
#[derive(Debug)]
pub struct MailerError {
    pub reason: String,
}

impl Display for MailerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "outbound message scheduling failed: {}", self.reason)
    }
}

impl Error for MailerError {}

/// Outbound messaging seam. Fire-and-forget; delivery retries belong to
/// the collaborator behind this trait, not to the core.
pub trait Mailer {
    fn schedule(
        &self,
        recipient_email: &str,
        template: MailTemplate,
        notification: &Notification,
    ) -> Result<(), MailerError>;
}

/// Mailer that drops every message. For callers without outbound mail.
pub struct NoopMailer;

impl Mailer for NoopMailer {
    fn schedule(
        &self,
        _recipient_email: &str,
        _template: MailTemplate,
        _notification: &Notification,
    ) -> Result<(), MailerError> {
        Ok(())
    }
}

/// Consumes domain events and performs notification fan-out.
pub struct EventDispatcher<'a, M: Mailer> {
    conn: &'a Connection,
    mailer: &'a M,
}

impl<'a, M: Mailer> EventDispatcher<'a, M> {
    pub fn new(conn: &'a Connection, mailer: &'a M) -> Self {
        Self { conn, mailer }
    }

    /// Fans one event out to its recipient set.
    ///
    /// Safe to re-run for the same event, but re-running creates duplicate
    /// notifications (at-least-once, no dedup key).
    pub fn dispatch(&self, event: &DomainEvent) -> RepoResult<Vec<NotificationId>> {
        match event {
            DomainEvent::TaskAssigned { task_id } => self.dispatch_task_assigned(*task_id),
            DomainEvent::CommentCreated { comment_id } => {
                self.dispatch_comment_created(*comment_id)
            }
        }
    }

    /// The assignee gets a single confirmation, born read.
    fn dispatch_task_assigned(&self, task_id: TaskId) -> RepoResult<Vec<NotificationId>> {
        let task = load_required_task(self.conn, task_id)?;
        let project = load_required_project(self.conn, task.project_id)?;
        let payload = NotificationPayload {
            entity_kind: "task".to_string(),
            entity_id: task.id,
            name: task.display_name(),
            deadline_ms: task.due_date_ms,
            parent_name: project.display_name(),
        };

        let ids = self.notify(
            &[task.assignee_id],
            NotificationKind::TaskAssigned,
            MailTemplate::TaskAssigned,
            &payload,
            true,
        )?;
        info!(
            "event=notify_fanout module=event status=ok kind=task_assigned task={task_id} recipients={}",
            ids.len()
        );
        Ok(ids)
    }

    fn dispatch_comment_created(&self, comment_id: CommentId) -> RepoResult<Vec<NotificationId>> {
        let comment = load_required_comment(self.conn, comment_id)?;

        let (recipients, payload) = match comment.parent {
            CommentParent::Task(task_id) => {
                let task = load_required_task(self.conn, task_id)?;
                let project = load_required_project(self.conn, task.project_id)?;
                let mut recipients = vec![task.assignee_id, team_owner_id(self.conn, project.id)?];
                recipients.extend(project_worker_ids(self.conn, project.id)?);
                let payload = NotificationPayload {
                    entity_kind: "task".to_string(),
                    entity_id: task.id,
                    name: task.display_name(),
                    deadline_ms: task.due_date_ms,
                    parent_name: project.display_name(),
                };
                (recipients, payload)
            }
            CommentParent::Project(project_id) => {
                let project = load_required_project(self.conn, project_id)?;
                let team = load_required_team(self.conn, project.team_id)?;
                let mut recipients = vec![project.created_by, team.owner_id];
                recipients.extend(project_worker_ids(self.conn, project.id)?);
                let payload = NotificationPayload {
                    entity_kind: "project".to_string(),
                    entity_id: project.id,
                    name: project.display_name(),
                    deadline_ms: project.due_date_ms,
                    parent_name: team.display_name(),
                };
                (recipients, payload)
            }
        };

        let recipients = dedup_preserving_order(recipients);
        let ids = self.notify(
            &recipients,
            NotificationKind::CommentCreated,
            MailTemplate::CommentCreated,
            &payload,
            false,
        )?;
        info!(
            "event=notify_fanout module=event status=ok kind=comment_created comment={comment_id} recipients={}",
            ids.len()
        );
        Ok(ids)
    }

    /// Creates one notification per recipient, then schedules one outbound
    /// message per recipient referencing the created row.
    fn notify(
        &self,
        recipients: &[PrincipalId],
        kind: NotificationKind,
        template: MailTemplate,
        payload: &NotificationPayload,
        already_read: bool,
    ) -> RepoResult<Vec<NotificationId>> {
        let repo = SqliteNotificationRepository::new(self.conn);
        let mut ids = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let notification =
                repo.create_notification(*recipient, kind, payload, already_read)?;
            ids.push(notification.id);

            let principal = load_required_principal(self.conn, *recipient)?;
            if let Err(err) = self
                .mailer
                .schedule(&principal.email, template, &notification)
            {
                error!(
                    "event=mail_schedule module=event status=error recipient={recipient} notification={} error={err}",
                    notification.id
                );
            }
        }
        Ok(ids)
    }
}

fn dedup_preserving_order(recipients: Vec<PrincipalId>) -> Vec<PrincipalId> {
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .filter(|recipient| seen.insert(*recipient))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::dedup_preserving_order;
    use uuid::Uuid;

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let deduped = dedup_preserving_order(vec![a, b, a, b, a]);
        assert_eq!(deduped, vec![a, b]);
    }
}
