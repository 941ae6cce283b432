//! Attachment repository.
//!
//! # Responsibility
//! - Persist attachment metadata with their tagged-union parent.
//! - Resolve parents into policy fact snapshots for one actor.
//!
//! # Invariants
//! - An attachment is only created under an existing parent.
//! - The blob itself lives in the blob store; rows only carry the path and
//!   caller-supplied size/mime metadata.

use crate::model::content::{Attachment, AttachmentId, AttachmentParent};
use crate::model::principal::PrincipalId;
use crate::policy::{AttachmentParentSnapshot, ProjectFacts, TaskFacts};
use crate::repo::comment_repo::load_required_comment;
use crate::repo::project_repo::{load_required_project, role_in_project, team_owner_id};
use crate::repo::task_repo::load_required_task;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const ATTACHMENT_SELECT_SQL: &str = "SELECT
    id,
    parent_kind,
    parent_id,
    path,
    file_name,
    file_size,
    mime_type,
    created_at
FROM attachments";

/// Metadata of a blob already written to the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub path: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
}

/// Repository interface for attachment operations.
pub trait AttachmentRepository {
    /// Creates one attachment row under an existing parent.
    fn create_attachment(
        &self,
        parent: AttachmentParent,
        blob: &StoredBlob,
    ) -> RepoResult<Attachment>;
    /// Loads one attachment by id.
    fn get_attachment(&self, id: AttachmentId) -> RepoResult<Option<Attachment>>;
    /// Lists all attachments.
    fn list_attachments(&self) -> RepoResult<Vec<Attachment>>;
    /// Lists attachments visible to one principal: on projects they work
    /// on or whose team they own, and on tasks within those projects.
    fn list_visible_to(&self, actor: PrincipalId) -> RepoResult<Vec<Attachment>>;
    /// Points the row at a replacement blob. Returns the updated row and
    /// the previous blob path.
    fn replace_attachment(
        &self,
        id: AttachmentId,
        blob: &StoredBlob,
    ) -> RepoResult<(Attachment, String)>;
    /// Deletes one attachment row. Returns the blob path that went away.
    fn delete_attachment(&self, id: AttachmentId) -> RepoResult<String>;
    /// Loads the parent entity with the edge facts policy needs for one
    /// actor.
    fn resolve_parent(
        &self,
        parent: AttachmentParent,
        actor: PrincipalId,
    ) -> RepoResult<AttachmentParentSnapshot>;
}

/// SQLite-backed attachment repository.
pub struct SqliteAttachmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAttachmentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AttachmentRepository for SqliteAttachmentRepository<'_> {
    fn create_attachment(
        &self,
        parent: AttachmentParent,
        blob: &StoredBlob,
    ) -> RepoResult<Attachment> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_attachment_parent_exists(&tx, parent)?;

        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO attachments (
                id,
                parent_kind,
                parent_id,
                path,
                file_name,
                file_size,
                mime_type
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                id.to_string(),
                parent.kind_str(),
                parent.id().to_string(),
                blob.path,
                blob.file_name,
                blob.file_size,
                blob.mime_type,
            ],
        )?;

        let attachment = load_required_attachment(&tx, id)?;
        tx.commit()?;
        Ok(attachment)
    }

    fn get_attachment(&self, id: AttachmentId) -> RepoResult<Option<Attachment>> {
        get_attachment(self.conn, id)
    }

    fn list_attachments(&self) -> RepoResult<Vec<Attachment>> {
        query_attachments(
            self.conn,
            &format!("{ATTACHMENT_SELECT_SQL} ORDER BY created_at ASC, id ASC;"),
            &[],
        )
    }

    fn list_visible_to(&self, actor: PrincipalId) -> RepoResult<Vec<Attachment>> {
        query_attachments(
            self.conn,
            &format!(
                "{ATTACHMENT_SELECT_SQL}
                 WHERE (parent_kind = 'project' AND parent_id IN (
                        SELECT project_id FROM project_workers WHERE principal_id = ?1
                        UNION
                        SELECT p.id FROM projects p
                        JOIN teams t ON t.id = p.team_id
                        WHERE t.owner_id = ?1
                    ))
                    OR (parent_kind = 'task' AND parent_id IN (
                        SELECT id FROM tasks
                        WHERE project_id IN (
                            SELECT project_id FROM project_workers WHERE principal_id = ?1
                        )
                    ))
                 ORDER BY created_at ASC, id ASC;"
            ),
            &[&actor.to_string()],
        )
    }

    fn replace_attachment(
        &self,
        id: AttachmentId,
        blob: &StoredBlob,
    ) -> RepoResult<(Attachment, String)> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let previous = load_required_attachment(&tx, id)?;

        tx.execute(
            "UPDATE attachments
             SET path = ?2,
                 file_name = ?3,
                 file_size = ?4,
                 mime_type = ?5
             WHERE id = ?1;",
            params![
                id.to_string(),
                blob.path,
                blob.file_name,
                blob.file_size,
                blob.mime_type,
            ],
        )?;

        let updated = load_required_attachment(&tx, id)?;
        tx.commit()?;
        Ok((updated, previous.path))
    }

    fn delete_attachment(&self, id: AttachmentId) -> RepoResult<String> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let attachment = load_required_attachment(&tx, id)?;
        tx.execute("DELETE FROM attachments WHERE id = ?1;", [id.to_string()])?;
        tx.commit()?;
        Ok(attachment.path)
    }

    fn resolve_parent(
        &self,
        parent: AttachmentParent,
        actor: PrincipalId,
    ) -> RepoResult<AttachmentParentSnapshot> {
        match parent {
            AttachmentParent::Project(project_id) => {
                let project = load_required_project(self.conn, project_id)?;
                let facts = ProjectFacts {
                    team_owner: team_owner_id(self.conn, project_id)?,
                    actor_role: role_in_project(self.conn, actor, project_id)?,
                };
                Ok(AttachmentParentSnapshot::Project { project, facts })
            }
            AttachmentParent::Task(task_id) => {
                let task = load_required_task(self.conn, task_id)?;
                let facts = TaskFacts {
                    actor_role: role_in_project(self.conn, actor, task.project_id)?,
                };
                Ok(AttachmentParentSnapshot::Task { task, facts })
            }
            AttachmentParent::Comment(comment_id) => {
                let comment = load_required_comment(self.conn, comment_id)?;
                Ok(AttachmentParentSnapshot::Comment { comment })
            }
        }
    }
}

pub(crate) fn get_attachment(
    conn: &Connection,
    id: AttachmentId,
) -> RepoResult<Option<Attachment>> {
    let mut stmt = conn.prepare(&format!("{ATTACHMENT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_attachment_row(row)?));
    }
    Ok(None)
}

fn load_required_attachment(conn: &Connection, id: AttachmentId) -> RepoResult<Attachment> {
    get_attachment(conn, id)?.ok_or(RepoError::NotFound {
        what: "attachment",
        id,
    })
}

fn ensure_attachment_parent_exists(
    conn: &Connection,
    parent: AttachmentParent,
) -> RepoResult<()> {
    let (sql, what) = match parent {
        AttachmentParent::Project(_) => {
            ("SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1);", "project")
        }
        AttachmentParent::Task(_) => ("SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1);", "task"),
        AttachmentParent::Comment(_) => {
            ("SELECT EXISTS(SELECT 1 FROM comments WHERE id = ?1);", "comment")
        }
    };
    let exists: i64 = conn.query_row(sql, [parent.id().to_string()], |row| row.get(0))?;
    if exists == 0 {
        return Err(RepoError::NotFound {
            what,
            id: parent.id(),
        });
    }
    Ok(())
}

fn query_attachments(
    conn: &Connection,
    sql: &str,
    bind: &[&dyn rusqlite::ToSql],
) -> RepoResult<Vec<Attachment>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(bind)?;
    let mut attachments = Vec::new();
    while let Some(row) = rows.next()? {
        attachments.push(parse_attachment_row(row)?);
    }
    Ok(attachments)
}

fn parse_attachment_row(row: &Row<'_>) -> RepoResult<Attachment> {
    let id_text: String = row.get("id")?;
    let kind_text: String = row.get("parent_kind")?;
    let parent_text: String = row.get("parent_id")?;

    let parent_id = parse_uuid(&parent_text, "attachments.parent_id")?;
    let parent = match kind_text.as_str() {
        "project" => AttachmentParent::Project(parent_id),
        "task" => AttachmentParent::Task(parent_id),
        "comment" => AttachmentParent::Comment(parent_id),
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid parent kind `{other}` in attachments.parent_kind"
            )));
        }
    };

    Ok(Attachment {
        id: parse_uuid(&id_text, "attachments.id")?,
        parent,
        path: row.get("path")?,
        file_name: row.get("file_name")?,
        file_size: row.get("file_size")?,
        mime_type: row.get("mime_type")?,
        created_at: row.get("created_at")?,
    })
}
