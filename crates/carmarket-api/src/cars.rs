use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use tracing::info;
use uuid::Uuid;

use carmarket_types::api::{CarQuery, UpdateCarStatusRequest};
use carmarket_types::models::{Car, CarDetails, CarStatus, User};

use crate::error::{ApiError, Result};
use crate::extract::{Path, Valid};
use crate::session;
use crate::state::{AppState, run_db};

/// Owners and staff may edit or remove a listing.
fn can_manage(user: &User, car: &Car) -> bool {
    car.created_by == user.id || user.role.is_staff()
}

async fn load_car(state: &AppState, id: Uuid) -> Result<Car> {
    run_db(state, move |db| db.get_car(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Car not found."))
}

pub async fn list_cars(
    State(state): State<AppState>,
    Query(query): Query<CarQuery>,
) -> Result<Json<Vec<Car>>> {
    let cars = run_db(&state, move |db| db.list_cars(&query)).await?;
    Ok(Json(cars))
}

/// Non-active listings are only visible to their owner and staff.
pub async fn get_car(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> Result<Json<Car>> {
    let car = load_car(&state, id).await?;
    if car.status == CarStatus::Active {
        return Ok(Json(car));
    }

    match session::current_user(&state, &jar).await? {
        Some(viewer) if can_manage(&viewer, &car) => Ok(Json(car)),
        _ => Err(ApiError::not_found("Car not found.")),
    }
}

pub async fn my_cars(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Car>>> {
    let cars = run_db(&state, move |db| db.list_cars_by_owner(user.id)).await?;
    Ok(Json(cars))
}

/// Staff publish directly, skipping moderation.
pub async fn create_car(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(details): Valid<CarDetails>,
) -> Result<impl IntoResponse> {
    let car = run_db(&state, move |db| db.create_car(user.id, &details, CarStatus::Active)).await?;
    info!(car_id = %car.id, created_by = %car.created_by, "car listed by staff");
    Ok((StatusCode::CREATED, Json(car)))
}

pub async fn update_car(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<User>,
    Valid(details): Valid<CarDetails>,
) -> Result<Json<Car>> {
    let car = load_car(&state, id).await?;
    if !can_manage(&user, &car) {
        return Err(ApiError::forbidden("Only the owner or staff can edit this car."));
    }

    let updated = run_db(&state, move |db| db.update_car_details(id, &details))
        .await?
        .ok_or_else(|| ApiError::not_found("Car not found."))?;
    Ok(Json(updated))
}

pub async fn update_car_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Valid(req): Valid<UpdateCarStatusRequest>,
) -> Result<Json<Car>> {
    let car = run_db(&state, move |db| db.set_car_status(id, req.status))
        .await?
        .ok_or_else(|| ApiError::not_found("Car not found."))?;
    info!(car_id = %car.id, status = %car.status, "car status changed");
    Ok(Json(car))
}

pub async fn delete_car(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<StatusCode> {
    let car = load_car(&state, id).await?;
    if !can_manage(&user, &car) {
        return Err(ApiError::forbidden("Only the owner or staff can delete this car."));
    }

    run_db(&state, move |db| db.delete_car(id)).await?;
    info!(car_id = %id, deleted_by = %user.id, "car deleted");
    Ok(StatusCode::NO_CONTENT)
}
