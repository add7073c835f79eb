use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior, params};
use uuid::Uuid;

use carmarket_types::models::{ApplicationStatus, Car, CarApplication, CarDetails, CarStatus};

use super::OptionalExt;
use super::cars::{insert_car, new_car};
use crate::Database;
use crate::models::{APPLICATION_COLUMNS, DETAIL_COLUMNS, application_row};

/// Result of moving an application out of `pending`.
#[derive(Debug)]
pub enum ReviewOutcome {
    NotFound,
    /// Already approved or rejected; nothing changed.
    AlreadyReviewed(ApplicationStatus),
    /// `car` is set exactly when the application was approved.
    Reviewed {
        application: CarApplication,
        car: Option<Car>,
    },
}

impl Database {
    pub fn create_application(&self, created_by: Uuid, details: &CarDetails) -> Result<CarApplication> {
        let application = CarApplication {
            id: Uuid::new_v4(),
            details: details.clone(),
            status: ApplicationStatus::Pending,
            created_by,
            reviewed_by: None,
            reviewed_at: None,
            car_id: None,
            created_at: Utc::now(),
        };

        self.with_conn(|conn| {
            let d = &application.details;
            conn.execute(
                &format!(
                    "INSERT INTO car_applications (id, {DETAIL_COLUMNS}, status, created_by, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    application.id,
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
                    application.status.as_str(),
                    application.created_by,
                    application.created_at,
                ],
            )?;
            Ok(())
        })?;

        Ok(application)
    }

    pub fn get_application(&self, id: Uuid) -> Result<Option<CarApplication>> {
        self.with_conn(|conn| query_application(conn, id))
    }

    /// Every application, newest first.
    pub fn list_applications(&self) -> Result<Vec<CarApplication>> {
        self.query_applications("1 = 1 ORDER BY created_at DESC", params![])
    }

    pub fn list_applications_by_user(&self, user_id: Uuid) -> Result<Vec<CarApplication>> {
        self.query_applications("created_by = ?1 ORDER BY created_at DESC", params![user_id])
    }

    /// Review queue, oldest first.
    pub fn list_pending_applications(&self) -> Result<Vec<CarApplication>> {
        self.query_applications("status = 'pending' ORDER BY created_at ASC", params![])
    }

    fn query_applications(
        &self,
        clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<CarApplication>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {APPLICATION_COLUMNS} FROM car_applications WHERE {clause}"
            ))?;
            let rows = stmt
                .query_map(args, application_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Approves or rejects a pending application.
    ///
    /// Approval copies the details into a new active listing owned by the
    /// submitter. The status check, the listing insert and the review stamp
    /// share one IMMEDIATE transaction, so an approved application always has
    /// exactly one listing.
    pub fn review_application(
        &self,
        id: Uuid,
        reviewer: Uuid,
        decision: ApplicationStatus,
    ) -> Result<ReviewOutcome> {
        anyhow::ensure!(decision.is_terminal(), "cannot review into {decision}");

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(application) = query_application(&tx, id)? else {
                return Ok(ReviewOutcome::NotFound);
            };
            if application.status.is_terminal() {
                return Ok(ReviewOutcome::AlreadyReviewed(application.status));
            }

            let car = match decision {
                ApplicationStatus::Approved => {
                    let car = new_car(application.created_by, &application.details, CarStatus::Active);
                    insert_car(&tx, &car)?;
                    Some(car)
                }
                _ => None,
            };

            let reviewed_at = Utc::now();
            tx.execute(
                "UPDATE car_applications
                 SET status = ?1, reviewed_by = ?2, reviewed_at = ?3, car_id = ?4
                 WHERE id = ?5",
                params![
                    decision.as_str(),
                    reviewer,
                    reviewed_at,
                    car.as_ref().map(|c| c.id),
                    id
                ],
            )?;
            tx.commit()?;

            Ok(ReviewOutcome::Reviewed {
                application: CarApplication {
                    status: decision,
                    reviewed_by: Some(reviewer),
                    reviewed_at: Some(reviewed_at),
                    car_id: car.as_ref().map(|c| c.id),
                    ..application
                },
                car,
            })
        })
    }
}

fn query_application(conn: &Connection, id: Uuid) -> Result<Option<CarApplication>> {
    conn.query_row(
        &format!("SELECT {APPLICATION_COLUMNS} FROM car_applications WHERE id = ?1"),
        [id],
        application_row,
    )
    .optional()
}
