use axum::{
    Extension,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::debug;

use carmarket_types::models::{Role, User};

use crate::error::ApiError;
use crate::session;
use crate::state::AppState;

/// Resolve the session cookie and attach the [`User`] to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let Some(active) = session::lookup(&state, &jar).await.map_err(IntoResponse::into_response)? else {
        return Err(ApiError::Unauthorized.into_response());
    };

    let Some(user) = active.user else {
        // User deleted under a live session
        debug!(user_id = %active.user_id, "dropping orphaned session");
        session::destroy(&state, active.id)
            .await
            .map_err(IntoResponse::into_response)?;
        return Err((session::clear_cookie(jar), ApiError::Unauthorized).into_response());
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Moderators and admins. Must run inside [`require_auth`].
pub async fn require_staff(
    Extension(user): Extension<User>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !user.role.is_staff() {
        return Err(ApiError::forbidden("Moderator or admin role required."));
    }
    Ok(next.run(req).await)
}

/// Admins only. Must run inside [`require_auth`].
pub async fn require_admin(
    Extension(user): Extension<User>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if user.role != Role::Admin {
        return Err(ApiError::forbidden("Admin role required."));
    }
    Ok(next.run(req).await)
}
