//! Admin-only user management, plus the startup admin bootstrap.

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use tracing::{info, warn};
use uuid::Uuid;

use carmarket_db::{Database, is_unique_violation};
use carmarket_types::api::{UpdateRoleRequest, UpdateUserRequest};
use carmarket_types::models::{Role, User};

use crate::auth::hash_password;
use crate::error::{ApiError, Result};
use crate::extract::{Path, Valid};
use crate::state::{AppState, run_db};

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    let users = run_db(&state, |db| db.list_users()).await?;
    Ok(Json(users))
}

/// Rename a user and/or reset their password. A new password ends every
/// session the user had.
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(admin): Extension<User>,
    Valid(req): Valid<UpdateUserRequest>,
) -> Result<Json<User>> {
    if req.username.is_none() && req.password.is_none() {
        return Err(ApiError::bad_request("Nothing to update."));
    }

    let password_changed = req.password.is_some();
    let updated = run_db(&state, move |db| {
        let hash = req.password.as_deref().map(hash_password).transpose()?;
        let user = match db.update_user(id, req.username.as_deref(), hash.as_deref()) {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(Err(ApiError::not_found("User not found."))),
            Err(e) if is_unique_violation(&e) => {
                return Ok(Err(ApiError::conflict("Username is already taken.")));
            }
            Err(e) => return Err(e),
        };
        if hash.is_some() {
            db.delete_sessions_for_user(id)?;
        }
        Ok(Ok(user))
    })
    .await??;

    info!(user_id = %id, admin = %admin.id, password_changed, "user updated");
    Ok(Json(updated))
}

pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(admin): Extension<User>,
    Valid(req): Valid<UpdateRoleRequest>,
) -> Result<Json<User>> {
    if id == admin.id {
        return Err(ApiError::bad_request("You cannot change your own role."));
    }

    let user = run_db(&state, move |db| db.set_user_role(id, req.role))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    info!(user_id = %id, role = %user.role, admin = %admin.id, "role changed");
    Ok(Json(user))
}

/// Cars, applications, favorites, messages and sessions go with the user.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(admin): Extension<User>,
) -> Result<StatusCode> {
    if id == admin.id {
        return Err(ApiError::bad_request("You cannot delete your own account."));
    }

    if !run_db(&state, move |db| db.delete_user(id)).await? {
        return Err(ApiError::not_found("User not found."));
    }

    warn!(user_id = %id, admin = %admin.id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Make sure the configured admin account exists with the admin role.
/// An existing account keeps its password.
pub fn bootstrap_admin(db: &Database, username: &str, password: &str) -> anyhow::Result<User> {
    if let Some(row) = db.get_user_by_username(username)? {
        if row.role == Role::Admin {
            return Ok(row.into());
        }
        info!(username = %row.username, "promoting existing user to admin");
        return db
            .set_user_role(row.id, Role::Admin)?
            .ok_or_else(|| anyhow::anyhow!("user {} vanished during promotion", row.id));
    }

    let hash = hash_password(password)?;
    let user = db.create_user(Uuid::new_v4(), username, &hash, Role::Admin)?;
    info!(username = %user.username, "created bootstrap admin");
    Ok(user)
}
