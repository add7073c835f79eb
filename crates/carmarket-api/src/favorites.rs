use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use carmarket_types::api::{FavoriteStatus, ToggleFavoriteRequest};
use carmarket_types::models::{Car, User};

use crate::error::{ApiError, Result};
use crate::extract::{Path, Valid};
use crate::state::{AppState, run_db};

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Car>>> {
    let cars = run_db(&state, move |db| db.list_favorite_cars(user.id)).await?;
    Ok(Json(cars))
}

/// Adds the favorite if absent, removes it if present.
pub async fn toggle(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(req): Valid<ToggleFavoriteRequest>,
) -> Result<Json<FavoriteStatus>> {
    let car_id = req.car_id;
    let favorited = run_db(&state, move |db| {
        if db.get_car(car_id)?.is_none() {
            return Ok(None);
        }
        db.toggle_favorite(user.id, car_id).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Car not found."))?;

    Ok(Json(FavoriteStatus { car_id, favorited }))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(car_id): Path<Uuid>,
) -> Result<StatusCode> {
    run_db(&state, move |db| db.remove_favorite(user.id, car_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(car_id): Path<Uuid>,
) -> Result<Json<FavoriteStatus>> {
    let favorited = run_db(&state, move |db| db.is_favorite(user.id, car_id)).await?;
    Ok(Json(FavoriteStatus { car_id, favorited }))
}
