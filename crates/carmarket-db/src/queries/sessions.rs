use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use super::OptionalExt;
use crate::Database;
use crate::models::{UserRow, parse_column};

/// A live session and whatever is left of its user.
pub struct SessionLookup {
    pub user_id: Uuid,
    pub user: Option<UserRow>,
}

impl Database {
    /// `id` is the hashed session token, never the raw cookie value.
    pub fn create_session(&self, id: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, user_id, Utc::now(), expires_at],
            )?;
            Ok(())
        })
    }

    /// Finds an unexpired session. The user join is outer so a session whose
    /// user vanished is still reported and can be torn down by the caller.
    pub fn get_session(&self, id: &str, now: DateTime<Utc>) -> Result<Option<SessionLookup>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT s.user_id, u.id, u.username, u.password, u.role, u.created_at
                 FROM sessions s
                 LEFT JOIN users u ON u.id = s.user_id
                 WHERE s.id = ?1 AND s.expires_at > ?2",
                params![id, now],
                |row| {
                    let user_id: Uuid = row.get(0)?;
                    let found: Option<Uuid> = row.get(1)?;
                    let user = match found {
                        Some(id) => Some(UserRow {
                            id,
                            username: row.get(2)?,
                            password: row.get(3)?,
                            role: parse_column(row, 4)?,
                            created_at: row.get(5)?,
                        }),
                        None => None,
                    };
                    Ok(SessionLookup { user_id, user })
                },
            )
            .optional()
        })
    }

    pub fn delete_session(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM sessions WHERE id = ?1", [id])? > 0))
    }

    pub fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?)
        })
    }

    pub fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])?)
        })
    }
}
