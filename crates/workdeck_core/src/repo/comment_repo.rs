//! Comment repository.
//!
//! # Responsibility
//! - Persist comments with their tagged-union parent (project or task).
//! - Resolve parents into policy fact snapshots for one actor.
//! - Answer the role-scoped visibility listing.
//!
//! # Invariants
//! - A comment is only created under an existing parent.
//! - Deleting a comment removes its attachments in the same transaction.

use crate::model::content::{Comment, CommentId, CommentParent};
use crate::model::principal::PrincipalId;
use crate::model::text::sanitize_text;
use crate::policy::{CommentParentSnapshot, ProjectFacts, TaskFacts};
use crate::repo::project_repo::{load_required_project, role_in_project, team_owner_id};
use crate::repo::task_repo::load_required_task;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const COMMENT_SELECT_SQL: &str = "SELECT
    id,
    parent_kind,
    parent_id,
    author_id,
    body,
    created_at,
    updated_at
FROM comments";

/// Repository interface for comment operations.
pub trait CommentRepository {
    /// Creates one comment under an existing parent.
    fn create_comment(
        &self,
        parent: CommentParent,
        author: PrincipalId,
        body: &str,
    ) -> RepoResult<Comment>;
    /// Loads one comment by id.
    fn get_comment(&self, id: CommentId) -> RepoResult<Option<Comment>>;
    /// Lists all comments.
    fn list_comments(&self) -> RepoResult<Vec<Comment>>;
    /// Lists comments under one parent.
    fn list_for_parent(&self, parent: CommentParent) -> RepoResult<Vec<Comment>>;
    /// Lists comments visible to one principal: own comments, comments on
    /// projects they work on or whose team they own, and comments on tasks
    /// within those projects.
    fn list_visible_to(&self, actor: PrincipalId) -> RepoResult<Vec<Comment>>;
    /// Replaces the comment body.
    fn update_body(&self, id: CommentId, body: &str) -> RepoResult<Comment>;
    /// Deletes one comment and its attachments. Returns orphaned blob
    /// paths.
    fn delete_comment(&self, id: CommentId) -> RepoResult<Vec<String>>;
    /// Loads the parent entity with the edge facts policy needs for one
    /// actor.
    fn resolve_parent(
        &self,
        parent: CommentParent,
        actor: PrincipalId,
    ) -> RepoResult<CommentParentSnapshot>;
}

/// SQLite-backed comment repository.
pub struct SqliteCommentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCommentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CommentRepository for SqliteCommentRepository<'_> {
    fn create_comment(
        &self,
        parent: CommentParent,
        author: PrincipalId,
        body: &str,
    ) -> RepoResult<Comment> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_comment_parent_exists(&tx, parent)?;

        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO comments (id, parent_kind, parent_id, author_id, body)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                id.to_string(),
                parent.kind_str(),
                parent.id().to_string(),
                author.to_string(),
                sanitize_text(body),
            ],
        )?;

        let comment = load_required_comment(&tx, id)?;
        tx.commit()?;
        Ok(comment)
    }

    fn get_comment(&self, id: CommentId) -> RepoResult<Option<Comment>> {
        get_comment(self.conn, id)
    }

    fn list_comments(&self) -> RepoResult<Vec<Comment>> {
        query_comments(
            self.conn,
            &format!("{COMMENT_SELECT_SQL} ORDER BY created_at ASC, id ASC;"),
            &[],
        )
    }

    fn list_for_parent(&self, parent: CommentParent) -> RepoResult<Vec<Comment>> {
        query_comments(
            self.conn,
            &format!(
                "{COMMENT_SELECT_SQL}
                 WHERE parent_kind = ?1 AND parent_id = ?2
                 ORDER BY created_at ASC, id ASC;"
            ),
            &[&parent.kind_str(), &parent.id().to_string()],
        )
    }

    fn list_visible_to(&self, actor: PrincipalId) -> RepoResult<Vec<Comment>> {
        query_comments(
            self.conn,
            &format!(
                "{COMMENT_SELECT_SQL}
                 WHERE author_id = ?1
                    OR (parent_kind = 'project' AND parent_id IN (
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

    fn update_body(&self, id: CommentId, body: &str) -> RepoResult<Comment> {
        let changed = self.conn.execute(
            "UPDATE comments
             SET body = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), sanitize_text(body)],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                what: "comment",
                id,
            });
        }
        load_required_comment(self.conn, id)
    }

    fn delete_comment(&self, id: CommentId) -> RepoResult<Vec<String>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_comment(&tx, id)?;

        let mut stmt = tx.prepare(
            "SELECT path FROM attachments WHERE parent_kind = 'comment' AND parent_id = ?1;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut blob_paths = Vec::new();
        while let Some(row) = rows.next()? {
            blob_paths.push(row.get(0)?);
        }
        drop(rows);
        drop(stmt);

        tx.execute(
            "DELETE FROM attachments WHERE parent_kind = 'comment' AND parent_id = ?1;",
            [id.to_string()],
        )?;
        tx.execute("DELETE FROM comments WHERE id = ?1;", [id.to_string()])?;

        tx.commit()?;
        Ok(blob_paths)
    }

    fn resolve_parent(
        &self,
        parent: CommentParent,
        actor: PrincipalId,
    ) -> RepoResult<CommentParentSnapshot> {
        resolve_comment_parent(self.conn, parent, actor)
    }
}

pub(crate) fn resolve_comment_parent(
    conn: &Connection,
    parent: CommentParent,
    actor: PrincipalId,
) -> RepoResult<CommentParentSnapshot> {
    match parent {
        CommentParent::Project(project_id) => {
            let project = load_required_project(conn, project_id)?;
            let facts = ProjectFacts {
                team_owner: team_owner_id(conn, project_id)?,
                actor_role: role_in_project(conn, actor, project_id)?,
            };
            Ok(CommentParentSnapshot::Project { project, facts })
        }
        CommentParent::Task(task_id) => {
            let task = load_required_task(conn, task_id)?;
            let facts = TaskFacts {
                actor_role: role_in_project(conn, actor, task.project_id)?,
            };
            Ok(CommentParentSnapshot::Task { task, facts })
        }
    }
}

pub(crate) fn get_comment(conn: &Connection, id: CommentId) -> RepoResult<Option<Comment>> {
    let mut stmt = conn.prepare(&format!("{COMMENT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_comment_row(row)?));
    }
    Ok(None)
}

pub(crate) fn load_required_comment(conn: &Connection, id: CommentId) -> RepoResult<Comment> {
    get_comment(conn, id)?.ok_or(RepoError::NotFound {
        what: "comment",
        id,
    })
}

fn ensure_comment_parent_exists(conn: &Connection, parent: CommentParent) -> RepoResult<()> {
    let (sql, what) = match parent {
        CommentParent::Project(_) => ("SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1);", "project"),
        CommentParent::Task(_) => ("SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1);", "task"),
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

fn query_comments(
    conn: &Connection,
    sql: &str,
    bind: &[&dyn rusqlite::ToSql],
) -> RepoResult<Vec<Comment>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(bind)?;
    let mut comments = Vec::new();
    while let Some(row) = rows.next()? {
        comments.push(parse_comment_row(row)?);
    }
    Ok(comments)
}

fn parse_comment_row(row: &Row<'_>) -> RepoResult<Comment> {
    let id_text: String = row.get("id")?;
    let kind_text: String = row.get("parent_kind")?;
    let parent_text: String = row.get("parent_id")?;
    let author_text: String = row.get("author_id")?;

    let parent_id = parse_uuid(&parent_text, "comments.parent_id")?;
    let parent = match kind_text.as_str() {
        "project" => CommentParent::Project(parent_id),
        "task" => CommentParent::Task(parent_id),
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid parent kind `{other}` in comments.parent_kind"
            )));
        }
    };

    Ok(Comment {
        id: parse_uuid(&id_text, "comments.id")?,
        parent,
        author_id: parse_uuid(&author_text, "comments.author_id")?,
        body: row.get("body")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
