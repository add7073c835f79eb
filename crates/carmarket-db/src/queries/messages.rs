use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use carmarket_types::models::Message;

use super::OptionalExt;
use crate::Database;
use crate::models::message_row;

// JOIN cars and users to fetch display names in a single query
const MESSAGE_SELECT: &str = "SELECT m.id, m.car_id, c.name, m.sender_id, s.username,
            m.recipient_id, r.username, m.content, m.is_read, m.created_at
     FROM messages m
     JOIN cars c ON c.id = m.car_id
     JOIN users s ON s.id = m.sender_id
     JOIN users r ON r.id = m.recipient_id";

impl Database {
    pub fn insert_message(
        &self,
        id: Uuid,
        car_id: Uuid,
        sender_id: Uuid,
        recipient_id: Uuid,
        content: &str,
    ) -> Result<Message> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, car_id, sender_id, recipient_id, content, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![id, car_id, sender_id, recipient_id, content, Utc::now()],
            )?;
            query_message(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("message {id} vanished after insert"))
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Everything the user sent or received, newest first.
    pub fn list_messages_for_user(&self, user_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT}
                 WHERE m.sender_id = ?1 OR m.recipient_id = ?1
                 ORDER BY m.created_at DESC, m.rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One thread between two users about one car, oldest first.
    pub fn list_conversation(&self, car_id: Uuid, user_a: Uuid, user_b: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT}
                 WHERE m.car_id = ?1
                   AND ((m.sender_id = ?2 AND m.recipient_id = ?3)
                     OR (m.sender_id = ?3 AND m.recipient_id = ?2))
                 ORDER BY m.created_at ASC, m.rowid ASC"
            ))?;
            let rows = stmt
                .query_map(params![car_id, user_a, user_b], message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE recipient_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?)
        })
    }

    pub fn mark_message_read(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute("UPDATE messages SET is_read = 1 WHERE id = ?1", [id])? > 0)
        })
    }

    /// Marks what `other` sent to `reader` about `car_id`. Returns the number
    /// of messages that flipped to read.
    pub fn mark_conversation_read(&self, car_id: Uuid, reader: Uuid, other: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE car_id = ?1 AND recipient_id = ?2 AND sender_id = ?3 AND is_read = 0",
                params![car_id, reader, other],
            )?)
        })
    }

    pub fn delete_message(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM messages WHERE id = ?1", [id])? > 0))
    }
}

fn query_message(conn: &Connection, id: Uuid) -> Result<Option<Message>> {
    conn.query_row(&format!("{MESSAGE_SELECT} WHERE m.id = ?1"), [id], message_row)
        .optional()
}
