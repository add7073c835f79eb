use anyhow::Result;
use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use carmarket_types::models::Car;

use crate::Database;
use crate::models::car_row;

impl Database {
    /// Toggle a favorite: removes if it exists, inserts if not.
    /// Returns true when the car is now favorited.
    pub fn toggle_favorite(&self, user_id: Uuid, car_id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let removed = tx.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND car_id = ?2",
                params![user_id, car_id],
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO favorites (user_id, car_id, created_at) VALUES (?1, ?2, ?3)",
                    params![user_id, car_id, Utc::now()],
                )?;
            }

            tx.commit()?;
            Ok(removed == 0)
        })
    }

    pub fn remove_favorite(&self, user_id: Uuid, car_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND car_id = ?2",
                params![user_id, car_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn is_favorite(&self, user_id: Uuid, car_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: i64 = conn.query_row(
                "SELECT COUNT(*) FROM favorites WHERE user_id = ?1 AND car_id = ?2",
                params![user_id, car_id],
                |row| row.get(0),
            )?;
            Ok(found > 0)
        })
    }

    /// Favorited cars, most recently favorited first.
    pub fn list_favorite_cars(&self, user_id: Uuid) -> Result<Vec<Car>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.price, c.category, c.server, c.max_speed, c.acceleration,
                        c.drive, c.phone, c.telegram, c.discord, c.image_url, c.description,
                        c.is_premium, c.status, c.created_by, c.created_at, c.updated_at
                 FROM favorites f
                 JOIN cars c ON c.id = f.car_id
                 WHERE f.user_id = ?1
                 ORDER BY f.created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], car_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
