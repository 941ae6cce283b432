//! Attachment use-case service.
//!
//! # Responsibility
//! - Attachment lifecycle over the blob store seam: store blob, then row;
//!   replace blob, then row, then delete the old blob; delete row, then
//!   blob.
//!
//! # Invariants
//! - Authorization delegates to the parent entity's attachment rule.
//! - A failed row write after a successful blob store attempts best-effort
//!   blob cleanup; the row is the source of truth.

use crate::blob::BlobStore;
use crate::cache::{keys, Cache};
use crate::model::content::{Attachment, AttachmentId, AttachmentParent};
use crate::model::principal::PrincipalId;
use crate::policy::{attachment_access, Actor, AttachmentAction};
use crate::repo::attachment_repo::{AttachmentRepository, StoredBlob};
use crate::repo::directory_repo::DirectoryRepository;
use crate::service::{cached_list, ensure_allowed, ServiceError, ServiceResult};
use log::{info, warn};

/// An upload handed in by the transport layer. Size and mime metadata are
/// caller-supplied; the core never inspects the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

/// Attachment service facade.
pub struct AttachmentService<R, D, C, B> {
    repo: R,
    directory: D,
    cache: C,
    blobs: B,
}

impl<R, D, C, B> AttachmentService<R, D, C, B>
where
    R: AttachmentRepository,
    D: DirectoryRepository,
    C: Cache,
    B: BlobStore,
{
    pub fn new(repo: R, directory: D, cache: C, blobs: B) -> Self {
        Self {
            repo,
            directory,
            cache,
            blobs,
        }
    }

    fn actor(&self, id: PrincipalId) -> ServiceResult<Actor> {
        Ok(Actor::new(id, self.directory.labels_for(id)?))
    }

    /// Lists every attachment for admins; otherwise the visibility slice
    /// over project and task parents.
    pub fn list_attachments(&self, actor_id: PrincipalId) -> ServiceResult<Vec<Attachment>> {
        let actor = self.actor(actor_id)?;
        if actor.is_admin() {
            return cached_list(&self.cache, &keys::all_attachments(), || {
                self.repo.list_attachments()
            });
        }
        Ok(self.repo.list_visible_to(actor_id)?)
    }

    /// Loads one attachment for a caller entitled to view it.
    pub fn show_attachment(
        &self,
        actor_id: PrincipalId,
        attachment_id: AttachmentId,
    ) -> ServiceResult<Attachment> {
        let actor = self.actor(actor_id)?;
        let attachment = self.require_attachment(attachment_id)?;
        let parent = self.repo.resolve_parent(attachment.parent, actor_id)?;
        ensure_allowed(attachment_access(&actor, AttachmentAction::View, &parent))?;
        Ok(attachment)
    }

    /// Stores the upload and creates the attachment row under the parent.
    pub fn create_attachment(
        &self,
        actor_id: PrincipalId,
        parent: AttachmentParent,
        upload: &Upload,
    ) -> ServiceResult<Attachment> {
        let actor = self.actor(actor_id)?;
        let snapshot = self.repo.resolve_parent(parent, actor_id)?;
        ensure_allowed(attachment_access(&actor, AttachmentAction::Create, &snapshot))?;

        let stored = self.store_upload(parent, upload)?;
        let attachment = match self.repo.create_attachment(parent, &stored) {
            Ok(attachment) => attachment,
            Err(err) => {
                // The row is the source of truth; do not leak the blob.
                if let Err(cleanup_err) = self.blobs.delete(&stored.path) {
                    warn!(
                        "event=blob_cleanup module=service status=error path={} error={cleanup_err}",
                        stored.path
                    );
                }
                return Err(err.into());
            }
        };

        self.cache.forget(&keys::all_attachments());
        info!(
            "event=attachment_create module=service status=ok attachment={} parent_kind={} size={}",
            attachment.id,
            parent.kind_str(),
            attachment.file_size
        );
        Ok(attachment)
    }

    /// Replaces the stored blob behind an attachment and deletes the
    /// previous one.
    pub fn replace_attachment(
        &self,
        actor_id: PrincipalId,
        attachment_id: AttachmentId,
        upload: &Upload,
    ) -> ServiceResult<Attachment> {
        let actor = self.actor(actor_id)?;
        let previous = self.require_attachment(attachment_id)?;
        let parent = self.repo.resolve_parent(previous.parent, actor_id)?;
        ensure_allowed(attachment_access(&actor, AttachmentAction::Update, &parent))?;

        let stored = self.store_upload(previous.parent, upload)?;
        let (attachment, old_path) = match self.repo.replace_attachment(attachment_id, &stored)
        {
            Ok(result) => result,
            Err(err) => {
                if let Err(cleanup_err) = self.blobs.delete(&stored.path) {
                    warn!(
                        "event=blob_cleanup module=service status=error path={} error={cleanup_err}",
                        stored.path
                    );
                }
                return Err(err.into());
            }
        };
        if let Err(err) = self.blobs.delete(&old_path) {
            warn!(
                "event=blob_cleanup module=service status=error path={old_path} error={err}"
            );
        }

        self.cache.forget(&keys::all_attachments());
        Ok(attachment)
    }

    /// Deletes the attachment row and its blob.
    pub fn delete_attachment(
        &self,
        actor_id: PrincipalId,
        attachment_id: AttachmentId,
    ) -> ServiceResult<()> {
        let actor = self.actor(actor_id)?;
        let attachment = self.require_attachment(attachment_id)?;
        let parent = self.repo.resolve_parent(attachment.parent, actor_id)?;
        ensure_allowed(attachment_access(&actor, AttachmentAction::Delete, &parent))?;

        let path = self.repo.delete_attachment(attachment_id)?;
        if let Err(err) = self.blobs.delete(&path) {
            warn!("event=blob_cleanup module=service status=error path={path} error={err}");
        }
        self.cache.forget(&keys::all_attachments());
        info!(
            "event=attachment_delete module=service status=ok attachment={attachment_id}"
        );
        Ok(())
    }

    fn store_upload(
        &self,
        parent: AttachmentParent,
        upload: &Upload,
    ) -> ServiceResult<StoredBlob> {
        let hint = match parent {
            AttachmentParent::Project(_) => "files_projects",
            AttachmentParent::Task(_) => "files_tasks",
            AttachmentParent::Comment(_) => "files_comments",
        };
        let path = self.blobs.store(&upload.bytes, hint, &upload.file_name)?;
        Ok(StoredBlob {
            path,
            file_name: upload.file_name.clone(),
            file_size: upload.bytes.len() as i64,
            mime_type: upload.mime_type.clone(),
        })
    }

    fn require_attachment(&self, attachment_id: AttachmentId) -> ServiceResult<Attachment> {
        self.repo
            .get_attachment(attachment_id)?
            .ok_or(ServiceError::NotFound {
                what: "attachment",
                id: attachment_id,
            })
    }
}
