use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use carmarket_db::ReviewOutcome;
use carmarket_types::api::ReviewApplicationRequest;
use carmarket_types::events::GatewayEvent;
use carmarket_types::models::{CarApplication, CarDetails, User};

use crate::error::{ApiError, Result};
use crate::extract::{Path, Valid};
use crate::state::{AppState, run_db};

/// Any signed-in user may propose a listing; it waits for staff review.
pub async fn submit(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(details): Valid<CarDetails>,
) -> Result<impl IntoResponse> {
    let application = run_db(&state, move |db| db.create_application(user.id, &details)).await?;
    info!(application_id = %application.id, created_by = %application.created_by, "application submitted");
    Ok((StatusCode::CREATED, Json(application)))
}

/// Staff see every application, everyone else only their own.
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<CarApplication>>> {
    let applications = run_db(&state, move |db| {
        if user.role.is_staff() {
            db.list_applications()
        } else {
            db.list_applications_by_user(user.id)
        }
    })
    .await?;
    Ok(Json(applications))
}

pub async fn pending(State(state): State<AppState>) -> Result<Json<Vec<CarApplication>>> {
    let applications = run_db(&state, |db| db.list_pending_applications()).await?;
    Ok(Json(applications))
}

pub async fn review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(reviewer): Extension<User>,
    Valid(req): Valid<ReviewApplicationRequest>,
) -> Result<Json<CarApplication>> {
    if !req.status.is_terminal() {
        return Err(ApiError::bad_request("Status must be 'approved' or 'rejected'."));
    }

    let outcome = run_db(&state, move |db| db.review_application(id, reviewer.id, req.status)).await?;

    let (application, car) = match outcome {
        ReviewOutcome::NotFound => return Err(ApiError::not_found("Application not found.")),
        ReviewOutcome::AlreadyReviewed(status) => {
            return Err(ApiError::conflict(format!("Application was already {status}.")));
        }
        ReviewOutcome::Reviewed { application, car } => (application, car),
    };

    info!(
        application_id = %application.id,
        status = %application.status,
        car_id = ?car.map(|c| c.id),
        reviewer = %reviewer.id,
        "application reviewed"
    );

    state
        .dispatcher
        .send_to_user(
            application.created_by,
            GatewayEvent::ApplicationReviewed {
                application: application.clone(),
            },
        )
        .await;

    Ok(Json(application))
}
