//! Database row types and row decoding.
//! Distinct from carmarket-types API models so the password hash never
//! leaves this crate by accident.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use carmarket_types::models::{Car, CarApplication, CarDetails, Message, Role, User};

pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            role: row.role,
            created_at: row.created_at,
        }
    }
}

pub(crate) const USER_COLUMNS: &str = "id, username, password, role, created_at";

pub(crate) const DETAIL_COLUMNS: &str = "name, price, category, server, max_speed, acceleration, drive, \
     phone, telegram, discord, image_url, description, is_premium";

pub(crate) const CAR_COLUMNS: &str = "id, name, price, category, server, max_speed, acceleration, drive, \
     phone, telegram, discord, image_url, description, is_premium, \
     status, created_by, created_at, updated_at";

pub(crate) const APPLICATION_COLUMNS: &str = "id, name, price, category, server, max_speed, acceleration, drive, \
     phone, telegram, discord, image_url, description, is_premium, \
     status, created_by, reviewed_by, reviewed_at, car_id, created_at";

/// Decode a TEXT column into one of the string-backed enums.
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        role: parse_column(row, 3)?,
        created_at: row.get(4)?,
    })
}

/// Reads the 13 detail columns starting at `offset`.
fn details_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<CarDetails> {
    Ok(CarDetails {
        name: row.get(offset)?,
        price: row.get(offset + 1)?,
        category: row.get(offset + 2)?,
        server: row.get(offset + 3)?,
        max_speed: row.get(offset + 4)?,
        acceleration: row.get(offset + 5)?,
        drive: row.get(offset + 6)?,
        phone: row.get(offset + 7)?,
        telegram: row.get(offset + 8)?,
        discord: row.get(offset + 9)?,
        image_url: row.get(offset + 10)?,
        description: row.get(offset + 11)?,
        is_premium: row.get(offset + 12)?,
    })
}

pub(crate) fn car_row(row: &Row<'_>) -> rusqlite::Result<Car> {
    Ok(Car {
        id: row.get(0)?,
        details: details_at(row, 1)?,
        status: parse_column(row, 14)?,
        created_by: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

pub(crate) fn application_row(row: &Row<'_>) -> rusqlite::Result<CarApplication> {
    Ok(CarApplication {
        id: row.get(0)?,
        details: details_at(row, 1)?,
        status: parse_column(row, 14)?,
        created_by: row.get(15)?,
        reviewed_by: row.get(16)?,
        reviewed_at: row.get(17)?,
        car_id: row.get(18)?,
        created_at: row.get(19)?,
    })
}

pub(crate) fn message_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        car_id: row.get(1)?,
        car_name: row.get(2)?,
        sender_id: row.get(3)?,
        sender_name: row.get(4)?,
        recipient_id: row.get(5)?,
        recipient_name: row.get(6)?,
        content: row.get(7)?,
        is_read: row.get(8)?,
        created_at: row.get(9)?,
    })
}
