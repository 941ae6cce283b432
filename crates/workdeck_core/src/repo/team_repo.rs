//! Team repository: team records, membership edges, ownership transfer.
//!
//! # Responsibility
//! - Persist teams and team↔principal membership edges.
//! - Execute the team half of the ownership transfer engine.
//!
//! # Invariants
//! - The owner is always a member; removing the owner edge is rejected.
//! - Ownership transfer re-validates every precondition inside its
//!   transaction, then updates the edge and reconciles both principals'
//!   `team_owner` labels atomically.

use crate::model::principal::{PrincipalId, RoleLabel};
use crate::model::team::{Team, TeamId};
use crate::model::text::normalize_name;
use crate::repo::directory_repo::{grant_label, principal_exists, reconcile_label};
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const TEAM_SELECT_SQL: &str = "SELECT id, name, owner_id, created_at, updated_at
FROM teams";

/// Repository interface for team and membership operations.
pub trait TeamRepository {
    /// Creates one team. The owner is attached as a member implicitly.
    fn create_team(
        &self,
        name: &str,
        owner: PrincipalId,
        member_ids: &[PrincipalId],
    ) -> RepoResult<Team>;
    /// Loads one team by id.
    fn get_team(&self, id: TeamId) -> RepoResult<Option<Team>>;
    /// Lists all teams.
    fn list_teams(&self) -> RepoResult<Vec<Team>>;
    /// Lists teams owned by one principal.
    fn list_owned(&self, owner: PrincipalId) -> RepoResult<Vec<Team>>;
    /// Renames one team.
    fn rename_team(&self, id: TeamId, name: &str) -> RepoResult<()>;
    /// Deletes one team and everything it owns. Returns the blob paths of
    /// attachments that went away with it.
    fn delete_team(&self, id: TeamId) -> RepoResult<Vec<String>>;
    /// Attaches members (idempotent per edge).
    fn add_members(&self, id: TeamId, member_ids: &[PrincipalId]) -> RepoResult<()>;
    /// Detaches members. Rejects removal of the current owner.
    fn remove_members(&self, id: TeamId, member_ids: &[PrincipalId]) -> RepoResult<()>;
    /// Lists member principal ids in deterministic order.
    fn member_ids(&self, id: TeamId) -> RepoResult<Vec<PrincipalId>>;
    /// Whether one principal is a member.
    fn is_member(&self, id: TeamId, principal: PrincipalId) -> RepoResult<bool>;
    /// Moves the accountable owner role to `new_owner`.
    fn transfer_ownership(&self, id: TeamId, new_owner: PrincipalId) -> RepoResult<Team>;
}

/// SQLite-backed team repository.
pub struct SqliteTeamRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTeamRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TeamRepository for SqliteTeamRepository<'_> {
    fn create_team(
        &self,
        name: &str,
        owner: PrincipalId,
        member_ids: &[PrincipalId],
    ) -> RepoResult<Team> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !principal_exists(&tx, owner)? {
            return Err(RepoError::NotFound {
                what: "principal",
                id: owner,
            });
        }

        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO teams (id, name, owner_id) VALUES (?1, ?2, ?3);",
            params![id.to_string(), normalize_name(name), owner.to_string()],
        )?;

        attach_member(&tx, id, owner)?;
        for member in member_ids {
            if !principal_exists(&tx, *member)? {
                return Err(RepoError::NotFound {
                    what: "principal",
                    id: *member,
                });
            }
            attach_member(&tx, id, *member)?;
        }

        grant_label(&tx, owner, RoleLabel::TeamOwner)?;
        let team = load_required_team(&tx, id)?;
        tx.commit()?;
        Ok(team)
    }

    fn get_team(&self, id: TeamId) -> RepoResult<Option<Team>> {
        get_team(self.conn, id)
    }

    fn list_teams(&self) -> RepoResult<Vec<Team>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TEAM_SELECT_SQL} ORDER BY created_at ASC, id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut teams = Vec::new();
        while let Some(row) = rows.next()? {
            teams.push(parse_team_row(row)?);
        }
        Ok(teams)
    }

    fn list_owned(&self, owner: PrincipalId) -> RepoResult<Vec<Team>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TEAM_SELECT_SQL} WHERE owner_id = ?1 ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([owner.to_string()])?;
        let mut teams = Vec::new();
        while let Some(row) = rows.next()? {
            teams.push(parse_team_row(row)?);
        }
        Ok(teams)
    }

    fn rename_team(&self, id: TeamId, name: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE teams
             SET name = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), normalize_name(name)],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound { what: "team", id });
        }
        Ok(())
    }

    fn delete_team(&self, id: TeamId) -> RepoResult<Vec<String>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let team = load_required_team(&tx, id)?;

        // Principals whose derived labels may dangle after the cascade.
        let worker_ids = team_worker_ids(&tx, id)?;

        let blob_paths = collect_team_blob_paths(&tx, id)?;
        delete_team_content(&tx, id)?;
        tx.execute("DELETE FROM teams WHERE id = ?1;", [id.to_string()])?;

        reconcile_label(&tx, team.owner_id, RoleLabel::TeamOwner)?;
        for worker in worker_ids {
            reconcile_label(&tx, worker, RoleLabel::ProjectManager)?;
            reconcile_label(&tx, worker, RoleLabel::Member)?;
        }

        tx.commit()?;
        Ok(blob_paths)
    }

    fn add_members(&self, id: TeamId, member_ids: &[PrincipalId]) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_team(&tx, id)?;
        for member in member_ids {
            if !principal_exists(&tx, *member)? {
                return Err(RepoError::NotFound {
                    what: "principal",
                    id: *member,
                });
            }
            attach_member(&tx, id, *member)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_members(&self, id: TeamId, member_ids: &[PrincipalId]) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let team = load_required_team(&tx, id)?;
        if member_ids.contains(&team.owner_id) {
            return Err(RepoError::InvariantViolation(
                "the team owner cannot be removed from the team".to_string(),
            ));
        }
        for member in member_ids {
            tx.execute(
                "DELETE FROM team_members WHERE team_id = ?1 AND principal_id = ?2;",
                params![id.to_string(), member.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn member_ids(&self, id: TeamId) -> RepoResult<Vec<PrincipalId>> {
        let mut stmt = self.conn.prepare(
            "SELECT principal_id FROM team_members
             WHERE team_id = ?1
             ORDER BY principal_id ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            members.push(parse_uuid(&value, "team_members.principal_id")?);
        }
        Ok(members)
    }

    fn is_member(&self, id: TeamId, principal: PrincipalId) -> RepoResult<bool> {
        is_member(self.conn, id, principal)
    }

    fn transfer_ownership(&self, id: TeamId, new_owner: PrincipalId) -> RepoResult<Team> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let team = load_required_team(&tx, id)?;
        let previous_owner = team.owner_id;

        if new_owner == previous_owner {
            return Err(RepoError::NoOpTransfer(new_owner));
        }
        if !is_member(&tx, id, new_owner)? {
            return Err(RepoError::NotEligible(
                "the new owner is not a member of the team".to_string(),
            ));
        }

        tx.execute(
            "UPDATE teams
             SET owner_id = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), new_owner.to_string()],
        )?;

        grant_label(&tx, new_owner, RoleLabel::TeamOwner)?;
        reconcile_label(&tx, previous_owner, RoleLabel::TeamOwner)?;

        let team = load_required_team(&tx, id)?;
        tx.commit()?;
        Ok(team)
    }
}

pub(crate) fn get_team(conn: &Connection, id: TeamId) -> RepoResult<Option<Team>> {
    let mut stmt = conn.prepare(&format!("{TEAM_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_team_row(row)?));
    }
    Ok(None)
}

pub(crate) fn load_required_team(conn: &Connection, id: TeamId) -> RepoResult<Team> {
    get_team(conn, id)?.ok_or(RepoError::NotFound { what: "team", id })
}

pub(crate) fn is_member(
    conn: &Connection,
    id: TeamId,
    principal: PrincipalId,
) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM team_members WHERE team_id = ?1 AND principal_id = ?2
        );",
        params![id.to_string(), principal.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn attach_member(conn: &Connection, id: TeamId, principal: PrincipalId) -> RepoResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO team_members (team_id, principal_id) VALUES (?1, ?2);",
        params![id.to_string(), principal.to_string()],
    )?;
    Ok(())
}

fn team_worker_ids(conn: &Connection, id: TeamId) -> RepoResult<Vec<PrincipalId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT principal_id FROM project_workers
         WHERE project_id IN (SELECT id FROM projects WHERE team_id = ?1)
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

/// Blob paths of every attachment under the team's projects, their tasks,
/// and comments on either.
fn collect_team_blob_paths(conn: &Connection, id: TeamId) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT path FROM attachments
         WHERE (parent_kind = 'project'
                AND parent_id IN (SELECT id FROM projects WHERE team_id = ?1))
            OR (parent_kind = 'task'
                AND parent_id IN (
                    SELECT id FROM tasks
                    WHERE project_id IN (SELECT id FROM projects WHERE team_id = ?1)))
            OR (parent_kind = 'comment'
                AND parent_id IN (
                    SELECT id FROM comments
                    WHERE (parent_kind = 'project'
                           AND parent_id IN (SELECT id FROM projects WHERE team_id = ?1))
                       OR (parent_kind = 'task'
                           AND parent_id IN (
                               SELECT id FROM tasks
                               WHERE project_id IN
                                   (SELECT id FROM projects WHERE team_id = ?1)))));",
    )?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut paths = Vec::new();
    while let Some(row) = rows.next()? {
        paths.push(row.get(0)?);
    }
    Ok(paths)
}

/// Deletes comments/attachments under the team. Projects, tasks and edges
/// go away through foreign-key cascades when the team row is deleted.
fn delete_team_content(conn: &Connection, id: TeamId) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM attachments
         WHERE (parent_kind = 'project'
                AND parent_id IN (SELECT id FROM projects WHERE team_id = ?1))
            OR (parent_kind = 'task'
                AND parent_id IN (
                    SELECT id FROM tasks
                    WHERE project_id IN (SELECT id FROM projects WHERE team_id = ?1)))
            OR (parent_kind = 'comment'
                AND parent_id IN (
                    SELECT id FROM comments
                    WHERE (parent_kind = 'project'
                           AND parent_id IN (SELECT id FROM projects WHERE team_id = ?1))
                       OR (parent_kind = 'task'
                           AND parent_id IN (
                               SELECT id FROM tasks
                               WHERE project_id IN
                                   (SELECT id FROM projects WHERE team_id = ?1)))));",
        [id.to_string()],
    )?;
    conn.execute(
        "DELETE FROM comments
         WHERE (parent_kind = 'project'
                AND parent_id IN (SELECT id FROM projects WHERE team_id = ?1))
            OR (parent_kind = 'task'
                AND parent_id IN (
                    SELECT id FROM tasks
                    WHERE project_id IN (SELECT id FROM projects WHERE team_id = ?1)));",
        [id.to_string()],
    )?;
    Ok(())
}

fn parse_team_row(row: &Row<'_>) -> RepoResult<Team> {
    let id_text: String = row.get("id")?;
    let owner_text: String = row.get("owner_id")?;
    Ok(Team {
        id: parse_uuid(&id_text, "teams.id")?,
        name: row.get("name")?,
        owner_id: parse_uuid(&owner_text, "teams.owner_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
