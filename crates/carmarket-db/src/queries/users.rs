use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use carmarket_types::models::{Role, User};

use super::OptionalExt;
use crate::Database;
use crate::models::{USER_COLUMNS, UserRow, user_row};

impl Database {
    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User> {
        let created_at = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, username_key, password, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, username, username_key(username), password_hash, role.as_str(), created_at],
            )?;
            Ok(User {
                id,
                username: username.to_string(),
                role,
                created_at,
            })
        })
    }

    /// Usernames compare case-insensitively.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username_key = ?1"),
                [username_key(username)],
                user_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
            ))?;
            let rows = stmt
                .query_map([], user_row)?
                .map(|r| r.map(User::from))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns `None` when the user does not exist.
    pub fn update_user(
        &self,
        id: Uuid,
        username: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<Option<User>> {
        self.with_conn(|conn| {
            if let Some(username) = username {
                conn.execute(
                    "UPDATE users SET username = ?1, username_key = ?2 WHERE id = ?3",
                    params![username, username_key(username), id],
                )?;
            }
            if let Some(hash) = password_hash {
                conn.execute(
                    "UPDATE users SET password = ?1 WHERE id = ?2",
                    params![hash, id],
                )?;
            }
            Ok(query_user_by_id(conn, id)?.map(User::from))
        })
    }

    pub fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                params![role.as_str(), id],
            )?;
            Ok(query_user_by_id(conn, id)?.map(User::from))
        })
    }

    /// Foreign keys cascade to cars, applications, favorites, messages and sessions.
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }
}

/// Case-folded form that uniqueness and lookups go through.
fn username_key(username: &str) -> String {
    username.to_lowercase()
}

fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        user_row,
    )
    .optional()
}
