use std::sync::LazyLock;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{info, warn};
use uuid::Uuid;

use carmarket_db::{Database, is_unique_violation};
use carmarket_types::api::{LoginRequest, RegisterRequest};
use carmarket_types::models::{Role, User};

use crate::error::{ApiError, Result};
use crate::extract::{ClientIp, Valid};
use crate::session;
use crate::state::{AppState, run_db};

/// Verified against when the username is unknown, so both failures cost one Argon2 run.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| hash_password("unused-dummy-password").ok());

/// Argon2id PHC string with a random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))
}

pub fn verify_password(password: &str, phc: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(phc).map_err(|e| anyhow::anyhow!("stored hash is invalid: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn reject_if_blocked(state: &AppState, ip: &str) -> Result<()> {
    match state.guard.block_remaining(ip) {
        Some(retry_after) => {
            warn!(%ip, "request from blocked address");
            Err(ApiError::TooManyAttempts { retry_after })
        }
        None => Ok(()),
    }
}

pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
    body: Result<Valid<RegisterRequest>>,
) -> Result<impl IntoResponse> {
    reject_if_blocked(&state, &ip)?;
    let Valid(req) = body?;

    let user = run_db(&state, move |db| {
        let hash = hash_password(&req.password)?;
        match db.create_user(Uuid::new_v4(), &req.username, &hash, Role::User) {
            Ok(user) => Ok(Some(user)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await?
    .ok_or_else(|| ApiError::conflict("Username is already taken."))?;

    info!(user_id = %user.id, username = %user.username, "user registered");

    let cookie = session::start(&state, user.id).await?;
    Ok((StatusCode::CREATED, jar.add(cookie), Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
    body: Result<Valid<LoginRequest>>,
) -> Result<impl IntoResponse> {
    reject_if_blocked(&state, &ip)?;
    let Valid(req) = body?;

    let username = req.username.clone();
    let user = run_db(&state, move |db| check_credentials(db, &req.username, &req.password)).await?;

    let Some(user) = user else {
        let outcome = state.guard.record_attempt(&ip, &username, false);
        warn!(%ip, %username, attempts_left = outcome.attempts_left, "failed login");
        if outcome.blocked {
            warn!(%ip, "too many failed logins, address blocked");
        }
        return Err(ApiError::InvalidCredentials {
            attempts_left: outcome.attempts_left,
        });
    };

    state.guard.record_attempt(&ip, &username, true);
    info!(user_id = %user.id, "user logged in");

    let cookie = session::start(&state, user.id).await?;
    Ok((jar.add(cookie), Json(user)))
}

/// Unknown usernames and wrong passwords both come back as `None`.
fn check_credentials(db: &Database, username: &str, password: &str) -> anyhow::Result<Option<User>> {
    let Some(row) = db.get_user_by_username(username)? else {
        if let Some(dummy) = DUMMY_HASH.as_deref() {
            verify_password(password, dummy)?;
        }
        return Ok(None);
    };
    if verify_password(password, &row.password)? {
        Ok(Some(row.into()))
    } else {
        Ok(None)
    }
}

pub async fn me(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    let Some(active) = session::lookup(&state, &jar).await? else {
        return Err(ApiError::Unauthorized);
    };

    match active.user {
        Some(user) => Ok(Json(user).into_response()),
        None => {
            session::destroy(&state, active.id).await?;
            Ok((session::clear_cookie(jar), ApiError::Unauthorized).into_response())
        }
    }
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<impl IntoResponse> {
    if let Some(active) = session::lookup(&state, &jar).await? {
        session::destroy(&state, active.id).await?;
        info!(user_id = %active.user_id, "user logged out");
    }
    Ok((StatusCode::NO_CONTENT, session::clear_cookie(jar)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_hash_is_not_the_password() {
        let hash = hash_password("Str0ng!pass").unwrap();
        assert_ne!(hash, "Str0ng!pass");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("Str0ng!pass", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn unknown_users_are_checked_against_an_equally_costly_hash() {
        let dummy = DUMMY_HASH.as_deref().expect("dummy hash");
        let real = hash_password("Str0ng!pass").unwrap();

        let dummy = PasswordHash::new(dummy).unwrap();
        let real = PasswordHash::new(&real).unwrap();
        assert_eq!(dummy.algorithm, real.algorithm);
        assert_eq!(dummy.version, real.version);
        assert_eq!(dummy.params, real.params);
    }

    #[test]
    fn credentials_fail_the_same_way_for_unknown_users() {
        let db = Database::open_in_memory().unwrap();
        let hash = hash_password("Str0ng!pass").unwrap();
        db.create_user(Uuid::new_v4(), "alice", &hash, Role::User).unwrap();

        assert!(check_credentials(&db, "ALICE", "Str0ng!pass").unwrap().is_some());
        assert!(check_credentials(&db, "alice", "nope").unwrap().is_none());
        assert!(check_credentials(&db, "nobody", "Str0ng!pass").unwrap().is_none());
    }
}
