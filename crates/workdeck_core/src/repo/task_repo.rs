//! Task repository.
//!
//! # Responsibility
//! - Persist tasks and their single-assignee slot.
//! - Provide the role-scoped listings used by service callers.
//!
//! # Invariants
//! - The assignee must hold a worker edge on the parent project at
//!   assignment time; this is re-checked inside the writing transaction.
//! - New tasks default to `pending` status and `medium` priority.

use crate::model::principal::PrincipalId;
use crate::model::project::{ProjectId, WorkerRole};
use crate::model::task::{NewTask, Task, TaskId, TaskPriority, TaskStatus, UpdateTask};
use crate::model::text::{normalize_name, sanitize_text};
use crate::repo::project_repo::{load_required_project, role_in_project};
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    name,
    description,
    status,
    priority,
    due_date_ms,
    assignee_id,
    created_at,
    updated_at
FROM tasks";

/// Repository interface for task operations.
pub trait TaskRepository {
    /// Creates one task. The assignee must be a worker of the project.
    fn create_task(&self, request: &NewTask) -> RepoResult<Task>;
    /// Loads one task by id.
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    /// Lists all tasks.
    fn list_tasks(&self) -> RepoResult<Vec<Task>>;
    /// Lists tasks under projects of teams owned by one principal.
    fn list_for_team_owner(&self, owner: PrincipalId) -> RepoResult<Vec<Task>>;
    /// Lists tasks under projects managed by one principal.
    fn list_managed(&self, manager: PrincipalId) -> RepoResult<Vec<Task>>;
    /// Lists tasks assigned to one principal.
    fn list_assigned(&self, assignee: PrincipalId) -> RepoResult<Vec<Task>>;
    /// Applies a partial update.
    fn update_task(&self, id: TaskId, patch: &UpdateTask) -> RepoResult<Task>;
    /// Deletes one task and its comments/attachments. Returns orphaned
    /// blob paths.
    fn delete_task(&self, id: TaskId) -> RepoResult<Vec<String>>;
    /// Moves the assignee slot to another project worker.
    fn assign_task(&self, id: TaskId, assignee: PrincipalId) -> RepoResult<Task>;
    /// Edge-role lookup on the parent project, for policy facts.
    fn role_in_project(
        &self,
        principal: PrincipalId,
        project: ProjectId,
    ) -> RepoResult<Option<WorkerRole>>;
    /// Flips past-due, unfinished tasks to `overdue`. Returns the number
    /// of rows changed.
    fn mark_overdue(&self, now_ms: i64) -> RepoResult<u32>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, request: &NewTask) -> RepoResult<Task> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_project(&tx, request.project_id)?;
        ensure_assignee_is_worker(&tx, request.project_id, request.assignee_id)?;

        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO tasks (
                id,
                project_id,
                name,
                description,
                status,
                priority,
                due_date_ms,
                assignee_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                id.to_string(),
                request.project_id.to_string(),
                normalize_name(&request.name),
                sanitize_text(&request.description),
                request.status.unwrap_or(TaskStatus::Pending).as_str(),
                request.priority.unwrap_or(TaskPriority::Medium).as_str(),
                request.due_date_ms,
                request.assignee_id.to_string(),
            ],
        )?;

        let task = load_required_task(&tx, id)?;
        tx.commit()?;
        Ok(task)
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        get_task(self.conn, id)
    }

    fn list_tasks(&self) -> RepoResult<Vec<Task>> {
        query_tasks(
            self.conn,
            &format!("{TASK_SELECT_SQL} ORDER BY created_at ASC, id ASC;"),
            &[],
        )
    }

    fn list_for_team_owner(&self, owner: PrincipalId) -> RepoResult<Vec<Task>> {
        query_tasks(
            self.conn,
            &format!(
                "{TASK_SELECT_SQL}
                 WHERE project_id IN (
                     SELECT p.id FROM projects p
                     JOIN teams t ON t.id = p.team_id
                     WHERE t.owner_id = ?1
                 )
                 ORDER BY created_at ASC, id ASC;"
            ),
            &[&owner.to_string()],
        )
    }

    fn list_managed(&self, manager: PrincipalId) -> RepoResult<Vec<Task>> {
        query_tasks(
            self.conn,
            &format!(
                "{TASK_SELECT_SQL}
                 WHERE project_id IN (
                     SELECT project_id FROM project_workers
                     WHERE principal_id = ?1 AND role = 'project_manager'
                 )
                 ORDER BY created_at ASC, id ASC;"
            ),
            &[&manager.to_string()],
        )
    }

    fn list_assigned(&self, assignee: PrincipalId) -> RepoResult<Vec<Task>> {
        query_tasks(
            self.conn,
            &format!(
                "{TASK_SELECT_SQL}
                 WHERE assignee_id = ?1
                 ORDER BY created_at ASC, id ASC;"
            ),
            &[&assignee.to_string()],
        )
    }

    fn update_task(&self, id: TaskId, patch: &UpdateTask) -> RepoResult<Task> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut task = load_required_task(&tx, id)?;

        if let Some(name) = &patch.name {
            task.name = normalize_name(name);
        }
        if let Some(description) = &patch.description {
            task.description = sanitize_text(description);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(due_date_ms) = patch.due_date_ms {
            task.due_date_ms = Some(due_date_ms);
        }

        tx.execute(
            "UPDATE tasks
             SET name = ?2,
                 description = ?3,
                 status = ?4,
                 priority = ?5,
                 due_date_ms = ?6,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id.to_string(),
                task.name,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                task.due_date_ms,
            ],
        )?;

        let task = load_required_task(&tx, id)?;
        tx.commit()?;
        Ok(task)
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<Vec<String>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_task(&tx, id)?;

        let mut stmt = tx.prepare(
            "SELECT path FROM attachments
             WHERE (parent_kind = 'task' AND parent_id = ?1)
                OR (parent_kind = 'comment'
                    AND parent_id IN (
                        SELECT id FROM comments
                        WHERE parent_kind = 'task' AND parent_id = ?1));",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut blob_paths = Vec::new();
        while let Some(row) = rows.next()? {
            blob_paths.push(row.get(0)?);
        }
        drop(rows);
        drop(stmt);

        tx.execute(
            "DELETE FROM attachments
             WHERE (parent_kind = 'task' AND parent_id = ?1)
                OR (parent_kind = 'comment'
                    AND parent_id IN (
                        SELECT id FROM comments
                        WHERE parent_kind = 'task' AND parent_id = ?1));",
            [id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM comments WHERE parent_kind = 'task' AND parent_id = ?1;",
            [id.to_string()],
        )?;
        tx.execute("DELETE FROM tasks WHERE id = ?1;", [id.to_string()])?;

        tx.commit()?;
        Ok(blob_paths)
    }

    fn assign_task(&self, id: TaskId, assignee: PrincipalId) -> RepoResult<Task> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let task = load_required_task(&tx, id)?;
        ensure_assignee_is_worker(&tx, task.project_id, assignee)?;

        tx.execute(
            "UPDATE tasks
             SET assignee_id = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), assignee.to_string()],
        )?;

        let task = load_required_task(&tx, id)?;
        tx.commit()?;
        Ok(task)
    }

    fn role_in_project(
        &self,
        principal: PrincipalId,
        project: ProjectId,
    ) -> RepoResult<Option<WorkerRole>> {
        role_in_project(self.conn, principal, project)
    }

    fn mark_overdue(&self, now_ms: i64) -> RepoResult<u32> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET status = 'overdue',
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE due_date_ms IS NOT NULL
               AND due_date_ms < ?1
               AND status NOT IN ('completed', 'overdue');",
            [now_ms],
        )?;
        Ok(changed as u32)
    }
}

pub(crate) fn get_task(conn: &Connection, id: TaskId) -> RepoResult<Option<Task>> {
    let mut stmt = conn.prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_task_row(row)?));
    }
    Ok(None)
}

pub(crate) fn load_required_task(conn: &Connection, id: TaskId) -> RepoResult<Task> {
    get_task(conn, id)?.ok_or(RepoError::NotFound { what: "task", id })
}

fn ensure_assignee_is_worker(
    conn: &Connection,
    project: ProjectId,
    assignee: PrincipalId,
) -> RepoResult<()> {
    if role_in_project(conn, assignee, project)?.is_none() {
        return Err(RepoError::NotEligible(
            "the assignee is not a worker on the task's project".to_string(),
        ));
    }
    Ok(())
}

fn query_tasks(
    conn: &Connection,
    sql: &str,
    bind: &[&dyn rusqlite::ToSql],
) -> RepoResult<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(bind)?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        tasks.push(parse_task_row(row)?);
    }
    Ok(tasks)
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("id")?;
    let project_text: String = row.get("project_id")?;
    let assignee_text: String = row.get("assignee_id")?;

    let status_text: String = row.get("status")?;
    let status = TaskStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in tasks.status"))
    })?;
    let priority_text: String = row.get("priority")?;
    let priority = TaskPriority::parse(&priority_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid priority `{priority_text}` in tasks.priority"
        ))
    })?;

    Ok(Task {
        id: parse_uuid(&id_text, "tasks.id")?,
        project_id: parse_uuid(&project_text, "tasks.project_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        status,
        priority,
        due_date_ms: row.get("due_date_ms")?,
        assignee_id: parse_uuid(&assignee_text, "tasks.assignee_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
