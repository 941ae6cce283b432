//! Comment use-case service.
//!
//! # Responsibility
//! - Comment CRUD with parent-delegated authorization.
//! - Hand `CommentCreated` events back to the caller for post-commit
//!   fan-out.
//!
//! # Invariants
//! - Creating a comment requires comment permission on the parent entity.
//! - Updating a comment is restricted to its author.

use crate::cache::{keys, Cache};
use crate::event::DomainEvent;
use crate::model::content::{Comment, CommentId, CommentParent};
use crate::model::principal::PrincipalId;
use crate::policy::{
    comment_access, project_access, task_access, Actor, CommentAction, CommentParentSnapshot,
    ProjectAction, TaskAction,
};
use crate::repo::comment_repo::CommentRepository;
use crate::repo::directory_repo::DirectoryRepository;
use crate::service::{cached_list, ensure_allowed, ServiceError, ServiceResult};
use log::info;

/// Comment service facade.
pub struct CommentService<R, D, C> {
    repo: R,
    directory: D,
    cache: C,
}

impl<R, D, C> CommentService<R, D, C>
where
    R: CommentRepository,
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

    /// Lists every comment for admins; otherwise the visibility slice:
    /// own comments, comments on projects the actor works on or whose
    /// team they own, and comments on tasks within those projects.
    pub fn list_comments(&self, actor_id: PrincipalId) -> ServiceResult<Vec<Comment>> {
        let actor = self.actor(actor_id)?;
        if actor.is_admin() {
            return cached_list(&self.cache, &keys::all_comments(), || {
                self.repo.list_comments()
            });
        }
        Ok(self.repo.list_visible_to(actor_id)?)
    }

    /// Loads one comment for a caller entitled to view it.
    pub fn show_comment(
        &self,
        actor_id: PrincipalId,
        comment_id: CommentId,
    ) -> ServiceResult<Comment> {
        let actor = self.actor(actor_id)?;
        let comment = self.require_comment(comment_id)?;
        let parent = self.repo.resolve_parent(comment.parent, actor_id)?;
        ensure_allowed(comment_access(&actor, CommentAction::View, &comment, &parent))?;
        Ok(comment)
    }

    /// Creates a comment under a project or task and returns it with the
    /// `CommentCreated` event to dispatch after commit.
    pub fn create_comment(
        &self,
        actor_id: PrincipalId,
        parent: CommentParent,
        body: &str,
    ) -> ServiceResult<(Comment, DomainEvent)> {
        let actor = self.actor(actor_id)?;
        let snapshot = self.repo.resolve_parent(parent, actor_id)?;
        let access = match &snapshot {
            CommentParentSnapshot::Project { facts, .. } => {
                project_access(&actor, ProjectAction::Comment, facts)
            }
            CommentParentSnapshot::Task { task, facts } => {
                task_access(&actor, TaskAction::Comment, task, facts)
            }
        };
        ensure_allowed(access)?;

        let comment = self.repo.create_comment(parent, actor_id, body)?;
        self.cache.forget(&keys::all_comments());
        info!(
            "event=comment_create module=service status=ok comment={} parent_kind={} parent={}",
            comment.id,
            parent.kind_str(),
            parent.id()
        );
        let event = DomainEvent::CommentCreated {
            comment_id: comment.id,
        };
        Ok((comment, event))
    }

    /// Replaces the body of the actor's own comment.
    pub fn update_comment(
        &self,
        actor_id: PrincipalId,
        comment_id: CommentId,
        body: &str,
    ) -> ServiceResult<Comment> {
        let actor = self.actor(actor_id)?;
        let comment = self.require_comment(comment_id)?;
        let parent = self.repo.resolve_parent(comment.parent, actor_id)?;
        ensure_allowed(comment_access(&actor, CommentAction::Update, &comment, &parent))?;

        let comment = self.repo.update_body(comment_id, body)?;
        self.cache.forget(&keys::all_comments());
        Ok(comment)
    }

    /// Deletes a comment with its attachments. Returns the blob paths of
    /// attachments removed by the cascade.
    pub fn delete_comment(
        &self,
        actor_id: PrincipalId,
        comment_id: CommentId,
    ) -> ServiceResult<Vec<String>> {
        let actor = self.actor(actor_id)?;
        let comment = self.require_comment(comment_id)?;
        let parent = self.repo.resolve_parent(comment.parent, actor_id)?;
        ensure_allowed(comment_access(&actor, CommentAction::Delete, &comment, &parent))?;

        let orphaned = self.repo.delete_comment(comment_id)?;
        self.cache.forget(&keys::all_comments());
        info!(
            "event=comment_delete module=service status=ok comment={comment_id} orphaned_blobs={}",
            orphaned.len()
        );
        Ok(orphaned)
    }

    fn require_comment(&self, comment_id: CommentId) -> ServiceResult<Comment> {
        self.repo
            .get_comment(comment_id)?
            .ok_or(ServiceError::NotFound {
                what: "comment",
                id: comment_id,
            })
    }
}
