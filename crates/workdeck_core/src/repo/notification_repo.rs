//! Notification repository.
//!
//! # Responsibility
//! - Persist one notification row per (event, recipient) pair.
//! - Serialize structured payloads as JSON text.
//!
//! # Invariants
//! - Rows are created once, mutated only by mark-read, deleted explicitly.

use crate::model::notification::{
    Notification, NotificationId, NotificationKind, NotificationPayload,
};
use crate::model::principal::PrincipalId;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const NOTIFICATION_SELECT_SQL: &str = "SELECT
    id,
    recipient_id,
    kind,
    payload,
    read_at,
    created_at
FROM notifications";

/// Repository interface for notification operations.
pub trait NotificationRepository {
    /// Creates one notification. `already_read` marks confirmations that
    /// are born read.
    fn create_notification(
        &self,
        recipient: PrincipalId,
        kind: NotificationKind,
        payload: &NotificationPayload,
        already_read: bool,
    ) -> RepoResult<Notification>;
    /// Loads one notification by id.
    fn get_notification(&self, id: NotificationId) -> RepoResult<Option<Notification>>;
    /// Lists all notifications.
    fn list_notifications(&self) -> RepoResult<Vec<Notification>>;
    /// Lists notifications addressed to one principal.
    fn list_for_recipient(&self, recipient: PrincipalId) -> RepoResult<Vec<Notification>>;
    /// Stamps the read timestamp.
    fn mark_read(&self, id: NotificationId) -> RepoResult<Notification>;
    /// Deletes one notification.
    fn delete_notification(&self, id: NotificationId) -> RepoResult<()>;
}

/// SQLite-backed notification repository.
pub struct SqliteNotificationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNotificationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl NotificationRepository for SqliteNotificationRepository<'_> {
    fn create_notification(
        &self,
        recipient: PrincipalId,
        kind: NotificationKind,
        payload: &NotificationPayload,
        already_read: bool,
    ) -> RepoResult<Notification> {
        let id = Uuid::new_v4();
        let payload_text = serde_json::to_string(payload).map_err(|err| {
            RepoError::InvalidData(format!("notification payload does not serialize: {err}"))
        })?;
        self.conn.execute(
            "INSERT INTO notifications (id, recipient_id, kind, payload, read_at)
             VALUES (
                ?1, ?2, ?3, ?4,
                CASE WHEN ?5 THEN (strftime('%s', 'now') * 1000) ELSE NULL END
             );",
            params![
                id.to_string(),
                recipient.to_string(),
                kind.as_str(),
                payload_text,
                already_read,
            ],
        )?;
        load_required_notification(self.conn, id)
    }

    fn get_notification(&self, id: NotificationId) -> RepoResult<Option<Notification>> {
        get_notification(self.conn, id)
    }

    fn list_notifications(&self) -> RepoResult<Vec<Notification>> {
        query_notifications(
            self.conn,
            &format!("{NOTIFICATION_SELECT_SQL} ORDER BY created_at ASC, id ASC;"),
            &[],
        )
    }

    fn list_for_recipient(&self, recipient: PrincipalId) -> RepoResult<Vec<Notification>> {
        query_notifications(
            self.conn,
            &format!(
                "{NOTIFICATION_SELECT_SQL}
                 WHERE recipient_id = ?1
                 ORDER BY created_at ASC, id ASC;"
            ),
            &[&recipient.to_string()],
        )
    }

    fn mark_read(&self, id: NotificationId) -> RepoResult<Notification> {
        let changed = self.conn.execute(
            "UPDATE notifications
             SET read_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                what: "notification",
                id,
            });
        }
        load_required_notification(self.conn, id)
    }

    fn delete_notification(&self, id: NotificationId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM notifications WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                what: "notification",
                id,
            });
        }
        Ok(())
    }
}

pub(crate) fn get_notification(
    conn: &Connection,
    id: NotificationId,
) -> RepoResult<Option<Notification>> {
    let mut stmt = conn.prepare(&format!("{NOTIFICATION_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_notification_row(row)?));
    }
    Ok(None)
}

fn load_required_notification(conn: &Connection, id: NotificationId) -> RepoResult<Notification> {
    get_notification(conn, id)?.ok_or(RepoError::NotFound {
        what: "notification",
        id,
    })
}

fn query_notifications(
    conn: &Connection,
    sql: &str,
    bind: &[&dyn rusqlite::ToSql],
) -> RepoResult<Vec<Notification>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(bind)?;
    let mut notifications = Vec::new();
    while let Some(row) = rows.next()? {
        notifications.push(parse_notification_row(row)?);
    }
    Ok(notifications)
}

fn parse_notification_row(row: &Row<'_>) -> RepoResult<Notification> {
    let id_text: String = row.get("id")?;
    let recipient_text: String = row.get("recipient_id")?;
    let kind_text: String = row.get("kind")?;
    let kind = NotificationKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid kind `{kind_text}` in notifications.kind"))
    })?;
    let payload_text: String = row.get("payload")?;
    let payload: NotificationPayload = serde_json::from_str(&payload_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid payload in notifications.payload: {err}"))
    })?;

    Ok(Notification {
        id: parse_uuid(&id_text, "notifications.id")?,
        recipient_id: parse_uuid(&recipient_text, "notifications.recipient_id")?,
        kind,
        payload,
        read_at: row.get("read_at")?,
        created_at: row.get("created_at")?,
    })
}
