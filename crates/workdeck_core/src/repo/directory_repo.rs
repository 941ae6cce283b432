//! Role Directory: principal records and derived role labels.
//!
//! # Responsibility
//! - Principal CRUD and lookup.
//! - Label lookup/grant/revoke and the single reconciliation entry point.
//!
//! # Invariants
//! - `reconcile_label` is the only code path deciding whether a derived
//!   label is kept; every edge mutation must call it for affected
//!   principals inside its own transaction.
//! - `admin` is never granted or revoked by reconciliation.

use crate::model::principal::{Principal, PrincipalId, RoleLabel};
use crate::model::text::normalize_name;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use uuid::Uuid;

const PRINCIPAL_SELECT_SQL: &str = "SELECT id, name, email, created_at, updated_at
FROM principals";

/// Repository interface for principals and the role directory.
pub trait DirectoryRepository {
    /// Creates one principal with a normalized name.
    fn create_principal(&self, name: &str, email: &str) -> RepoResult<Principal>;
    /// Loads one principal by id.
    fn get_principal(&self, id: PrincipalId) -> RepoResult<Option<Principal>>;
    /// Loads one principal by unique email.
    fn find_by_email(&self, email: &str) -> RepoResult<Option<Principal>>;
    /// Returns all labels currently held by one principal.
    fn labels_for(&self, id: PrincipalId) -> RepoResult<BTreeSet<RoleLabel>>;
    /// Whether the principal currently holds one label.
    fn has_label(&self, id: PrincipalId, label: RoleLabel) -> RepoResult<bool>;
    /// Grants one label (idempotent). Intended for `admin` seeding;
    /// derived labels normally flow through reconciliation.
    fn grant_label(&self, id: PrincipalId, label: RoleLabel) -> RepoResult<()>;
    /// Revokes one label (idempotent).
    fn revoke_label(&self, id: PrincipalId, label: RoleLabel) -> RepoResult<()>;
    /// Recomputes one derived label from edge reality. Returns whether the
    /// label is held after reconciliation.
    fn reconcile_label(&self, id: PrincipalId, label: RoleLabel) -> RepoResult<bool>;
}

/// SQLite-backed role directory.
pub struct SqliteDirectoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDirectoryRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DirectoryRepository for SqliteDirectoryRepository<'_> {
    fn create_principal(&self, name: &str, email: &str) -> RepoResult<Principal> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO principals (id, name, email) VALUES (?1, ?2, ?3);",
            params![id.to_string(), normalize_name(name), email.trim()],
        )?;
        load_required_principal(self.conn, id)
    }

    fn get_principal(&self, id: PrincipalId) -> RepoResult<Option<Principal>> {
        get_principal(self.conn, id)
    }

    fn find_by_email(&self, email: &str) -> RepoResult<Option<Principal>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PRINCIPAL_SELECT_SQL} WHERE email = ?1;"))?;
        let mut rows = stmt.query([email.trim()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_principal_row(row)?));
        }
        Ok(None)
    }

    fn labels_for(&self, id: PrincipalId) -> RepoResult<BTreeSet<RoleLabel>> {
        labels_for(self.conn, id)
    }

    fn has_label(&self, id: PrincipalId, label: RoleLabel) -> RepoResult<bool> {
        has_label(self.conn, id, label)
    }

    fn grant_label(&self, id: PrincipalId, label: RoleLabel) -> RepoResult<()> {
        grant_label(self.conn, id, label)
    }

    fn revoke_label(&self, id: PrincipalId, label: RoleLabel) -> RepoResult<()> {
        revoke_label(self.conn, id, label)
    }

    fn reconcile_label(&self, id: PrincipalId, label: RoleLabel) -> RepoResult<bool> {
        reconcile_label(self.conn, id, label)
    }
}

pub(crate) fn get_principal(
    conn: &Connection,
    id: PrincipalId,
) -> RepoResult<Option<Principal>> {
    let mut stmt = conn.prepare(&format!("{PRINCIPAL_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_principal_row(row)?));
    }
    Ok(None)
}

pub(crate) fn load_required_principal(
    conn: &Connection,
    id: PrincipalId,
) -> RepoResult<Principal> {
    get_principal(conn, id)?.ok_or(RepoError::NotFound {
        what: "principal",
        id,
    })
}

pub(crate) fn principal_exists(conn: &Connection, id: PrincipalId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM principals WHERE id = ?1);",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn labels_for(
    conn: &Connection,
    id: PrincipalId,
) -> RepoResult<BTreeSet<RoleLabel>> {
    let mut stmt =
        conn.prepare("SELECT role FROM principal_roles WHERE principal_id = ?1;")?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut labels = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        let label = RoleLabel::parse(&value).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid role `{value}` in principal_roles.role"))
        })?;
        labels.insert(label);
    }
    Ok(labels)
}

pub(crate) fn has_label(
    conn: &Connection,
    id: PrincipalId,
    label: RoleLabel,
) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM principal_roles WHERE principal_id = ?1 AND role = ?2
        );",
        params![id.to_string(), label.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn grant_label(
    conn: &Connection,
    id: PrincipalId,
    label: RoleLabel,
) -> RepoResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO principal_roles (principal_id, role) VALUES (?1, ?2);",
        params![id.to_string(), label.as_str()],
    )?;
    Ok(())
}

pub(crate) fn revoke_label(
    conn: &Connection,
    id: PrincipalId,
    label: RoleLabel,
) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM principal_roles WHERE principal_id = ?1 AND role = ?2;",
        params![id.to_string(), label.as_str()],
    )?;
    Ok(())
}

/// Recomputes one derived label from the edges that justify it.
///
/// - `team_owner`: at least one team owned.
/// - `project_manager`: at least one manager worker edge.
/// - `member`: at least one worker edge of any role.
/// - `admin`: not derived; current state is returned unchanged.
pub(crate) fn reconcile_label(
    conn: &Connection,
    id: PrincipalId,
    label: RoleLabel,
) -> RepoResult<bool> {
    let qualifying_sql = match label {
        RoleLabel::Admin => return has_label(conn, id, label),
        RoleLabel::TeamOwner => "SELECT COUNT(*) FROM teams WHERE owner_id = ?1",
        RoleLabel::ProjectManager => {
            "SELECT COUNT(*) FROM project_workers
             WHERE principal_id = ?1 AND role = 'project_manager'"
        }
        RoleLabel::Member => "SELECT COUNT(*) FROM project_workers WHERE principal_id = ?1",
    };

    let qualifying: i64 = conn
        .query_row(qualifying_sql, [id.to_string()], |row| row.get(0))
        .optional()?
        .unwrap_or(0);

    if qualifying > 0 {
        grant_label(conn, id, label)?;
        Ok(true)
    } else {
        revoke_label(conn, id, label)?;
        Ok(false)
    }
}

fn parse_principal_row(row: &Row<'_>) -> RepoResult<Principal> {
    let id_text: String = row.get("id")?;
    Ok(Principal {
        id: parse_uuid(&id_text, "principals.id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
