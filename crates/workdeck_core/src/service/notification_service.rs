//! Notification use-case service.
//!
//! # Responsibility
//! - Recipient-scoped notification listing, mark-read and deletion.
//!
//! # Invariants
//! - A principal only sees its own notifications unless it is an admin.
//! - Rows are created by the event dispatcher, never by this service.

use crate::cache::{keys, Cache};
use crate::model::notification::{Notification, NotificationId};
use crate::model::principal::PrincipalId;
use crate::policy::{notification_access, Actor, NotificationAction};
use crate::repo::directory_repo::DirectoryRepository;
use crate::repo::notification_repo::NotificationRepository;
use crate::service::{cached_list, ensure_allowed, ServiceError, ServiceResult};

/// Notification service facade.
pub struct NotificationService<R, D, C> {
    repo: R,
    directory: D,
    cache: C,
}

impl<R, D, C> NotificationService<R, D, C>
where
    R: NotificationRepository,
    D: DirectoryRepository,
    C: Cache,
{
    pub fn new(repo: R, directory: D, cache: C) -> Self {
        Self {
            repo,
            directory,
            cache,
        }
    }

    fn actor(&self, id: PrincipalId) -> ServiceResult<Actor> {
        Ok(Actor::new(id, self.directory.labels_for(id)?))
    }

    /// Lists every notification for admins, otherwise the actor's own.
    pub fn list_notifications(&self, actor_id: PrincipalId) -> ServiceResult<Vec<Notification>> {
        let actor = self.actor(actor_id)?;
        if actor.is_admin() {
            return cached_list(&self.cache, &keys::all_notifications(), || {
                self.repo.list_notifications()
            });
        }
        Ok(self.repo.list_for_recipient(actor_id)?)
    }

    /// Loads one notification for its recipient or an admin.
    pub fn show_notification(
        &self,
        actor_id: PrincipalId,
        notification_id: NotificationId,
    ) -> ServiceResult<Notification> {
        let actor = self.actor(actor_id)?;
        let notification = self.require_notification(notification_id)?;
        ensure_allowed(notification_access(
            &actor,
            NotificationAction::View,
            &notification,
        ))?;
        Ok(notification)
    }

    /// Stamps the read timestamp.
    pub fn mark_read(
        &self,
        actor_id: PrincipalId,
        notification_id: NotificationId,
    ) -> ServiceResult<Notification> {
        let actor = self.actor(actor_id)?;
        let notification = self.require_notification(notification_id)?;
        ensure_allowed(notification_access(
            &actor,
            NotificationAction::MarkRead,
            &notification,
        ))?;

        let notification = self.repo.mark_read(notification_id)?;
        self.cache.forget(&keys::all_notifications());
        Ok(notification)
    }

    /// Deletes one notification.
    pub fn delete_notification(
        &self,
        actor_id: PrincipalId,
        notification_id: NotificationId,
    ) -> ServiceResult<()> {
        let actor = self.actor(actor_id)?;
        let notification = self.require_notification(notification_id)?;
        ensure_allowed(notification_access(
            &actor,
            NotificationAction::Delete,
            &notification,
        ))?;

        self.repo.delete_notification(notification_id)?;
        self.cache.forget(&keys::all_notifications());
        Ok(())
    }

    fn require_notification(
        &self,
        notification_id: NotificationId,
    ) -> ServiceResult<Notification> {
        self.repo
            .get_notification(notification_id)?
            .ok_or(ServiceError::NotFound {
                what: "notification",
                id: notification_id,
            })
    }
}
