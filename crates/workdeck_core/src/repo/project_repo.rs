//! Project repository: project records, worker edges, manager transfer.
//!
//! # Responsibility
//! - Persist projects and project↔principal worker edges with their
//!   per-edge role attribute.
//! - Execute the project half of the ownership transfer engine.
//!
//! # Invariants
//! - A project with at least one worker has exactly one manager edge,
//!   backed by a partial unique index.
//! - The creator becomes the manager edge on creation.
//! - Removing the manager edge is rejected unless done through
//!   `transfer_manager`.

use crate::model::principal::{PrincipalId, RoleLabel};
use crate::model::project::{
    NewProject, Project, ProjectId, ProjectStatus, UpdateProject, WorkerEdge, WorkerRole,
};
use crate::model::team::TeamId;
use crate::model::text::{normalize_name, sanitize_text};
use crate::repo::directory_repo::{grant_label, principal_exists, reconcile_label};
use crate::repo::team_repo::is_member;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const PROJECT_SELECT_SQL: &str = "SELECT
    id,
    team_id,
    name,
    description,
    status,
    due_date_ms,
    created_by,
    created_at,
    updated_at
FROM projects";

/// Repository interface for project and worker-edge operations.
pub trait ProjectRepository {
    /// Creates one project; the creator becomes the manager edge.
    fn create_project(&self, request: &NewProject, creator: PrincipalId) -> RepoResult<Project>;
    /// Loads one project by id.
    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>>;
    /// Lists all projects.
    fn list_projects(&self) -> RepoResult<Vec<Project>>;
    /// Lists projects belonging to teams owned by one principal.
    fn list_for_team_owner(&self, owner: PrincipalId) -> RepoResult<Vec<Project>>;
    /// Lists projects managed by one principal.
    fn list_managed(&self, manager: PrincipalId) -> RepoResult<Vec<Project>>;
    /// Lists completed projects.
    fn completed_projects(&self) -> RepoResult<Vec<Project>>;
    /// Per-project count of completed tasks.
    fn completed_task_counts(&self) -> RepoResult<Vec<(ProjectId, u32)>>;
    /// Applies a partial update.
    fn update_project(&self, id: ProjectId, patch: &UpdateProject) -> RepoResult<Project>;
    /// Deletes one project and everything it owns. Returns orphaned blob
    /// paths.
    fn delete_project(&self, id: ProjectId) -> RepoResult<Vec<String>>;
    /// Adds one worker edge with an explicit role.
    fn add_worker(
        &self,
        id: ProjectId,
        principal: PrincipalId,
        role: WorkerRole,
    ) -> RepoResult<()>;
    /// Adds member-role worker edges (idempotent per edge).
    fn add_workers(&self, id: ProjectId, worker_ids: &[PrincipalId]) -> RepoResult<()>;
    /// Removes worker edges. Rejects removal of the current manager.
    /// Returns the number of tasks left assigned to removed workers.
    fn remove_workers(&self, id: ProjectId, worker_ids: &[PrincipalId]) -> RepoResult<u32>;
    /// Lists worker edges in deterministic order.
    fn worker_edges(&self, id: ProjectId) -> RepoResult<Vec<WorkerEdge>>;
    /// Edge-role lookup used pervasively by authorization.
    fn role_in_project(
        &self,
        principal: PrincipalId,
        id: ProjectId,
    ) -> RepoResult<Option<WorkerRole>>;
    /// The current manager edge holder, if the project has workers.
    fn manager_of(&self, id: ProjectId) -> RepoResult<Option<PrincipalId>>;
    /// Owner of the project's parent team.
    fn team_owner_id(&self, id: ProjectId) -> RepoResult<PrincipalId>;
    /// Whether one principal is a member of one team. Used to gate
    /// project creation.
    fn is_team_member(&self, team: TeamId, principal: PrincipalId) -> RepoResult<bool>;
    /// Moves the accountable manager role to `new_manager`.
    fn transfer_manager(&self, id: ProjectId, new_manager: PrincipalId)
        -> RepoResult<Project>;
    /// Flips past-due, non-completed projects to `overdue`. Returns the
    /// number of rows changed.
    fn mark_overdue(&self, now_ms: i64) -> RepoResult<u32>;
}

/// SQLite-backed project repository.
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create_project(&self, request: &NewProject, creator: PrincipalId) -> RepoResult<Project> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let team_exists: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM teams WHERE id = ?1);",
            [request.team_id.to_string()],
            |row| row.get(0),
        )?;
        if team_exists == 0 {
            return Err(RepoError::NotFound {
                what: "team",
                id: request.team_id,
            });
        }

        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO projects (id, team_id, name, description, due_date_ms, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id.to_string(),
                request.team_id.to_string(),
                normalize_name(&request.name),
                sanitize_text(&request.description),
                request.due_date_ms,
                creator.to_string(),
            ],
        )?;

        // Creator takes the single manager edge; everyone else is a member.
        attach_worker(&tx, id, creator, WorkerRole::ProjectManager)?;
        grant_label(&tx, creator, RoleLabel::ProjectManager)?;
        grant_label(&tx, creator, RoleLabel::Member)?;
        for worker in &request.worker_ids {
            if *worker == creator {
                continue;
            }
            if !principal_exists(&tx, *worker)? {
                return Err(RepoError::NotFound {
                    what: "principal",
                    id: *worker,
                });
            }
            attach_worker(&tx, id, *worker, WorkerRole::Member)?;
            grant_label(&tx, *worker, RoleLabel::Member)?;
        }

        let project = load_required_project(&tx, id)?;
        tx.commit()?;
        Ok(project)
    }

    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>> {
        get_project(self.conn, id)
    }

    fn list_projects(&self) -> RepoResult<Vec<Project>> {
        query_projects(
            self.conn,
            &format!("{PROJECT_SELECT_SQL} ORDER BY created_at ASC, id ASC;"),
            &[],
        )
    }

    fn list_for_team_owner(&self, owner: PrincipalId) -> RepoResult<Vec<Project>> {
        query_projects(
            self.conn,
            &format!(
                "{PROJECT_SELECT_SQL}
                 WHERE team_id IN (SELECT id FROM teams WHERE owner_id = ?1)
                 ORDER BY created_at ASC, id ASC;"
            ),
            &[&owner.to_string()],
        )
    }

    fn list_managed(&self, manager: PrincipalId) -> RepoResult<Vec<Project>> {
        query_projects(
            self.conn,
            &format!(
                "{PROJECT_SELECT_SQL}
                 WHERE id IN (
                     SELECT project_id FROM project_workers
                     WHERE principal_id = ?1 AND role = 'project_manager'
                 )
                 ORDER BY created_at ASC, id ASC;"
            ),
            &[&manager.to_string()],
        )
    }

    fn completed_projects(&self) -> RepoResult<Vec<Project>> {
        query_projects(
            self.conn,
            &format!(
                "{PROJECT_SELECT_SQL}
                 WHERE status = 'completed'
                 ORDER BY created_at ASC, id ASC;"
            ),
            &[],
        )
    }

    fn completed_task_counts(&self) -> RepoResult<Vec<(ProjectId, u32)>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, COUNT(t.id)
             FROM projects p
             LEFT JOIN tasks t ON t.project_id = p.id AND t.status = 'completed'
             GROUP BY p.id
             ORDER BY p.created_at ASC, p.id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut counts = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            let count: u32 = row.get(1)?;
            counts.push((parse_uuid(&id_text, "projects.id")?, count));
        }
        Ok(counts)
    }

    fn update_project(&self, id: ProjectId, patch: &UpdateProject) -> RepoResult<Project> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut project = load_required_project(&tx, id)?;

        if let Some(name) = &patch.name {
            project.name = normalize_name(name);
        }
        if let Some(description) = &patch.description {
            project.description = sanitize_text(description);
        }
        if let Some(status) = patch.status {
            project.status = status;
        }
        if let Some(due_date_ms) = patch.due_date_ms {
            project.due_date_ms = Some(due_date_ms);
        }

        tx.execute(
            "UPDATE projects
             SET name = ?2,
                 description = ?3,
                 status = ?4,
                 due_date_ms = ?5,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id.to_string(),
                project.name,
                project.description,
                project.status.as_str(),
                project.due_date_ms,
            ],
        )?;

        let project = load_required_project(&tx, id)?;
        tx.commit()?;
        Ok(project)
    }

    fn delete_project(&self, id: ProjectId) -> RepoResult<Vec<String>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_project(&tx, id)?;

        let worker_ids = project_worker_ids(&tx, id)?;
        let blob_paths = collect_project_blob_paths(&tx, id)?;
        delete_project_content(&tx, id)?;
        tx.execute("DELETE FROM projects WHERE id = ?1;", [id.to_string()])?;

        for worker in worker_ids {
            reconcile_label(&tx, worker, RoleLabel::ProjectManager)?;
            reconcile_label(&tx, worker, RoleLabel::Member)?;
        }

        tx.commit()?;
        Ok(blob_paths)
    }

    fn add_worker(
        &self,
        id: ProjectId,
        principal: PrincipalId,
        role: WorkerRole,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_project(&tx, id)?;
        if !principal_exists(&tx, principal)? {
            return Err(RepoError::NotFound {
                what: "principal",
                id: principal,
            });
        }

        match role {
            WorkerRole::Member => {
                attach_worker(&tx, id, principal, WorkerRole::Member)?;
                grant_label(&tx, principal, RoleLabel::Member)?;
            }
            WorkerRole::ProjectManager => {
                match manager_of(&tx, id)? {
                    Some(current) if current == principal => {}
                    Some(current) => {
                        return Err(RepoError::RoleConflict(format!(
                            "project already has a manager: {current}; demote first"
                        )));
                    }
                    None => {}
                }
                tx.execute(
                    "INSERT INTO project_workers (project_id, principal_id, role)
                     VALUES (?1, ?2, 'project_manager')
                     ON CONFLICT(project_id, principal_id)
                     DO UPDATE SET role = 'project_manager';",
                    params![id.to_string(), principal.to_string()],
                )?;
                grant_label(&tx, principal, RoleLabel::ProjectManager)?;
                grant_label(&tx, principal, RoleLabel::Member)?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn add_workers(&self, id: ProjectId, worker_ids: &[PrincipalId]) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_project(&tx, id)?;
        for worker in worker_ids {
            if !principal_exists(&tx, *worker)? {
                return Err(RepoError::NotFound {
                    what: "principal",
                    id: *worker,
                });
            }
            attach_worker(&tx, id, *worker, WorkerRole::Member)?;
            grant_label(&tx, *worker, RoleLabel::Member)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_workers(&self, id: ProjectId, worker_ids: &[PrincipalId]) -> RepoResult<u32> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_project(&tx, id)?;

        if let Some(manager) = manager_of(&tx, id)? {
            if worker_ids.contains(&manager) {
                return Err(RepoError::InvariantViolation(
                    "the project manager cannot be removed from the project".to_string(),
                ));
            }
        }

        let mut dangling: u32 = 0;
        for worker in worker_ids {
            let assigned: u32 = tx.query_row(
                "SELECT COUNT(*) FROM tasks WHERE project_id = ?1 AND assignee_id = ?2;",
                params![id.to_string(), worker.to_string()],
                |row| row.get(0),
            )?;
            dangling += assigned;
            tx.execute(
                "DELETE FROM project_workers WHERE project_id = ?1 AND principal_id = ?2;",
                params![id.to_string(), worker.to_string()],
            )?;
            reconcile_label(&tx, *worker, RoleLabel::ProjectManager)?;
            reconcile_label(&tx, *worker, RoleLabel::Member)?;
        }

        tx.commit()?;
        Ok(dangling)
    }

    fn worker_edges(&self, id: ProjectId) -> RepoResult<Vec<WorkerEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT principal_id, role FROM project_workers
             WHERE project_id = ?1
             ORDER BY principal_id ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            let principal_text: String = row.get(0)?;
            let role_text: String = row.get(1)?;
            let role = WorkerRole::parse(&role_text).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "invalid role `{role_text}` in project_workers.role"
                ))
            })?;
            edges.push(WorkerEdge {
                principal_id: parse_uuid(&principal_text, "project_workers.principal_id")?,
                role,
            });
        }
        Ok(edges)
    }

    fn role_in_project(
        &self,
        principal: PrincipalId,
        id: ProjectId,
    ) -> RepoResult<Option<WorkerRole>> {
        role_in_project(self.conn, principal, id)
    }

    fn manager_of(&self, id: ProjectId) -> RepoResult<Option<PrincipalId>> {
        manager_of(self.conn, id)
    }

    fn team_owner_id(&self, id: ProjectId) -> RepoResult<PrincipalId> {
        team_owner_id(self.conn, id)
    }

    fn is_team_member(&self, team: TeamId, principal: PrincipalId) -> RepoResult<bool> {
        is_member(self.conn, team, principal)
    }

    fn transfer_manager(
        &self,
        id: ProjectId,
        new_manager: PrincipalId,
    ) -> RepoResult<Project> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_project(&tx, id)?;

        let previous_manager = manager_of(&tx, id)?.ok_or_else(|| {
            RepoError::InvariantViolation("the project has no manager edge".to_string())
        })?;
        if new_manager == previous_manager {
            return Err(RepoError::NoOpTransfer(new_manager));
        }
        if role_in_project(&tx, new_manager, id)?.is_none() {
            return Err(RepoError::NotEligible(
                "the new project manager is not a worker on this project".to_string(),
            ));
        }

        // Demote before promote; the partial unique index forbids two
        // manager edges at any point inside the transaction.
        tx.execute(
            "UPDATE project_workers SET role = 'member'
             WHERE project_id = ?1 AND principal_id = ?2;",
            params![id.to_string(), previous_manager.to_string()],
        )?;
        tx.execute(
            "UPDATE project_workers SET role = 'project_manager'
             WHERE project_id = ?1 AND principal_id = ?2;",
            params![id.to_string(), new_manager.to_string()],
        )?;

        grant_label(&tx, new_manager, RoleLabel::ProjectManager)?;
        reconcile_label(&tx, previous_manager, RoleLabel::ProjectManager)?;

        let project = load_required_project(&tx, id)?;
        tx.commit()?;
        Ok(project)
    }

    fn mark_overdue(&self, now_ms: i64) -> RepoResult<u32> {
        let changed = self.conn.execute(
            "UPDATE projects
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

pub(crate) fn get_project(conn: &Connection, id: ProjectId) -> RepoResult<Option<Project>> {
    let mut stmt = conn.prepare(&format!("{PROJECT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_project_row(row)?));
    }
    Ok(None)
}

pub(crate) fn load_required_project(conn: &Connection, id: ProjectId) -> RepoResult<Project> {
    get_project(conn, id)?.ok_or(RepoError::NotFound {
        what: "project",
        id,
    })
}

/// O(1) edge-role lookup backed by the (project, principal) primary key.
pub(crate) fn role_in_project(
    conn: &Connection,
    principal: PrincipalId,
    id: ProjectId,
) -> RepoResult<Option<WorkerRole>> {
    let role_text: Option<String> = conn
        .query_row(
            "SELECT role FROM project_workers WHERE project_id = ?1 AND principal_id = ?2;",
            params![id.to_string(), principal.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match role_text {
        None => Ok(None),
        Some(value) => WorkerRole::parse(&value)
            .map(Some)
            .ok_or_else(|| {
                RepoError::InvalidData(format!("invalid role `{value}` in project_workers.role"))
            }),
    }
}

pub(crate) fn manager_of(conn: &Connection, id: ProjectId) -> RepoResult<Option<PrincipalId>> {
    let principal_text: Option<String> = conn
        .query_row(
            "SELECT principal_id FROM project_workers
             WHERE project_id = ?1 AND role = 'project_manager';",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match principal_text {
        None => Ok(None),
        Some(value) => Ok(Some(parse_uuid(&value, "project_workers.principal_id")?)),
    }
}

pub(crate) fn team_owner_id(conn: &Connection, id: ProjectId) -> RepoResult<PrincipalId> {
    let owner_text: Option<String> = conn
        .query_row(
            "SELECT t.owner_id FROM teams t
             JOIN projects p ON p.team_id = t.id
             WHERE p.id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match owner_text {
        None => Err(RepoError::NotFound {
            what: "project",
            id,
        }),
        Some(value) => parse_uuid(&value, "teams.owner_id"),
    }
}

fn attach_worker(
    conn: &Connection,
    id: ProjectId,
    principal: PrincipalId,
    role: WorkerRole,
) -> RepoResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO project_workers (project_id, principal_id, role)
         VALUES (?1, ?2, ?3);",
        params![id.to_string(), principal.to_string(), role.as_str()],
    )?;
    Ok(())
}

pub(crate) fn project_worker_ids(conn: &Connection, id: ProjectId) -> RepoResult<Vec<PrincipalId>> {
    let mut stmt = conn.prepare(
        "SELECT principal_id FROM project_workers
         WHERE project_id = ?1
         ORDER BY principal_id ASC;",
    )?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut workers = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        workers.push(parse_uuid(&value, "project_workers.principal_id")?);
    }
    Ok(workers)
}

fn collect_project_blob_paths(conn: &Connection, id: ProjectId) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT path FROM attachments
         WHERE (parent_kind = 'project' AND parent_id = ?1)
            OR (parent_kind = 'task'
                AND parent_id IN (SELECT id FROM tasks WHERE project_id = ?1))
            OR (parent_kind = 'comment'
                AND parent_id IN (
                    SELECT id FROM comments
                    WHERE (parent_kind = 'project' AND parent_id = ?1)
                       OR (parent_kind = 'task'
                           AND parent_id IN
                               (SELECT id FROM tasks WHERE project_id = ?1))));",
    )?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut paths = Vec::new();
    while let Some(row) = rows.next()? {
        paths.push(row.get(0)?);
    }
    Ok(paths)
}

fn delete_project_content(conn: &Connection, id: ProjectId) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM attachments
         WHERE (parent_kind = 'project' AND parent_id = ?1)
            OR (parent_kind = 'task'
                AND parent_id IN (SELECT id FROM tasks WHERE project_id = ?1))
            OR (parent_kind = 'comment'
                AND parent_id IN (
                    SELECT id FROM comments
                    WHERE (parent_kind = 'project' AND parent_id = ?1)
                       OR (parent_kind = 'task'
                           AND parent_id IN
                               (SELECT id FROM tasks WHERE project_id = ?1))));",
        [id.to_string()],
    )?;
    conn.execute(
        "DELETE FROM comments
         WHERE (parent_kind = 'project' AND parent_id = ?1)
            OR (parent_kind = 'task'
                AND parent_id IN (SELECT id FROM tasks WHERE project_id = ?1));",
        [id.to_string()],
    )?;
    Ok(())
}

fn query_projects(
    conn: &Connection,
    sql: &str,
    bind: &[&dyn rusqlite::ToSql],
) -> RepoResult<Vec<Project>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(bind)?;
    let mut projects = Vec::new();
    while let Some(row) = rows.next()? {
        projects.push(parse_project_row(row)?);
    }
    Ok(projects)
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    let id_text: String = row.get("id")?;
    let team_text: String = row.get("team_id")?;
    let creator_text: String = row.get("created_by")?;
    let status_text: String = row.get("status")?;
    let status = ProjectStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in projects.status"))
    })?;
    Ok(Project {
        id: parse_uuid(&id_text, "projects.id")?,
        team_id: parse_uuid(&team_text, "projects.team_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        status,
        due_date_ms: row.get("due_date_ms")?,
        created_by: parse_uuid(&creator_text, "projects.created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
