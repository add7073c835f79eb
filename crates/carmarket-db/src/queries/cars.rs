use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use carmarket_types::api::CarQuery;
use carmarket_types::models::{Car, CarDetails, CarStatus};

use super::OptionalExt;
use crate::Database;
use crate::models::{CAR_COLUMNS, DETAIL_COLUMNS, car_row};

impl Database {
    pub fn create_car(&self, created_by: Uuid, details: &CarDetails, status: CarStatus) -> Result<Car> {
        self.with_conn(|conn| {
            let car = new_car(created_by, details, status);
            insert_car(conn, &car)?;
            Ok(car)
        })
    }

    pub fn get_car(&self, id: Uuid) -> Result<Option<Car>> {
        self.with_conn(|conn| query_car(conn, id))
    }

    /// Active listings, newest first. `search` is matched in Rust so that
    /// case folding also works for non-ASCII names.
    pub fn list_cars(&self, query: &CarQuery) -> Result<Vec<Car>> {
        let cars = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAR_COLUMNS} FROM cars
                 WHERE status = 'active'
                   AND (?1 IS NULL OR category = ?1)
                   AND (?2 IS NULL OR server = ?2)
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map(params![query.category(), query.server()], car_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let Some(needle) = query.search().map(str::to_lowercase) else {
            return Ok(cars);
        };

        Ok(cars
            .into_iter()
            .filter(|car| {
                car.details.name.to_lowercase().contains(&needle)
                    || car
                        .details
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .collect())
    }

    pub fn list_cars_by_owner(&self, owner: Uuid) -> Result<Vec<Car>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAR_COLUMNS} FROM cars WHERE created_by = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([owner], car_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Replaces every descriptive field. Returns `None` for unknown ids.
    pub fn update_car_details(&self, id: Uuid, details: &CarDetails) -> Result<Option<Car>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE cars SET name = ?1, price = ?2, category = ?3, server = ?4,
                     max_speed = ?5, acceleration = ?6, drive = ?7, phone = ?8,
                     telegram = ?9, discord = ?10, image_url = ?11, description = ?12,
                     is_premium = ?13, updated_at = ?14
                 WHERE id = ?15",
                params![
                    details.name,
                    details.price,
                    details.category,
                    details.server,
                    details.max_speed,
                    details.acceleration,
                    details.drive,
                    details.phone,
                    details.telegram,
                    details.discord,
                    details.image_url,
                    details.description,
                    details.is_premium,
                    Utc::now(),
                    id,
                ],
            )?;
            query_car(conn, id)
        })
    }

    pub fn set_car_status(&self, id: Uuid, status: CarStatus) -> Result<Option<Car>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE cars SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now(), id],
            )?;
            query_car(conn, id)
        })
    }

    /// Favorites and messages about the car go with it.
    pub fn delete_car(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM cars WHERE id = ?1", [id])? > 0))
    }
}

pub(crate) fn new_car(created_by: Uuid, details: &CarDetails, status: CarStatus) -> Car {
    let now = Utc::now();
    Car {
        id: Uuid::new_v4(),
        details: details.clone(),
        status,
        created_by,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn insert_car(conn: &Connection, car: &Car) -> rusqlite::Result<()> {
    let d = &car.details;
    conn.execute(
        &format!(
            "INSERT INTO cars (id, {DETAIL_COLUMNS}, status, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ),
        params![
            car.id,
            d.name,
            d.price,
            d.category,
            d.server,
            d.max_speed,
            d.acceleration,
            d.drive,
            d.phone,
            d.telegram,
            d.discord,
            d.image_url,
            d.description,
            d.is_premium,
            car.status.as_str(),
            car.created_by,
            car.created_at,
            car.updated_at,
        ],
    )?;
    Ok(())
}

fn query_car(conn: &Connection, id: Uuid) -> Result<Option<Car>> {
    conn.query_row(
        &format!("SELECT {CAR_COLUMNS} FROM cars WHERE id = ?1"),
        [id],
        car_row,
    )
    .optional()
}
