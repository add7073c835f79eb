//! Server-side sessions carried by an opaque cookie.
//!
//! The browser holds a random token. The database only ever sees
//! `hex(HMAC-SHA256(secret, token))`, so a leaked sessions table cannot be
//! replayed without the server secret.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use carmarket_types::models::User;

use crate::error::Result;
use crate::state::{AppState, run_db};

pub const SESSION_COOKIE: &str = "carmarket.sid";

/// Sessions expire this long after login. There is no sliding renewal.
pub const SESSION_TTL_SECS: i64 = 2 * 60 * 60;

type HmacSha256 = Hmac<Sha256>;

pub struct SessionConfig {
    mac: HmacSha256,
    secure: bool,
}

impl SessionConfig {
    /// `secure` adds the `Secure` flag to issued cookies.
    pub fn new(secret: &[u8], secure: bool) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| anyhow::anyhow!("invalid session secret: {e}"))?;
        Ok(Self { mac, secure })
    }

    pub fn generate_token() -> String {
        let bytes: [u8; 32] = rand::random();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Storage key for a token.
    pub fn hash(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .http_only(true)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(time::Duration::seconds(SESSION_TTL_SECS))
            .secure(self.secure)
            .build()
    }
}

/// A session row resolved from the request cookie.
pub struct ActiveSession {
    pub id: String,
    pub user_id: Uuid,
    /// `None` when the user was deleted after login.
    pub user: Option<User>,
}

/// Persist a fresh session and return the cookie that carries it.
pub async fn start(state: &AppState, user_id: Uuid) -> Result<Cookie<'static>> {
    let token = SessionConfig::generate_token();
    let id = state.sessions.hash(&token);
    let expires_at = Utc::now() + chrono::Duration::seconds(SESSION_TTL_SECS);

    run_db(state, move |db| db.create_session(&id, user_id, expires_at)).await?;
    debug!(%user_id, "session started");
    Ok(state.sessions.cookie(token))
}

pub async fn lookup(state: &AppState, jar: &CookieJar) -> Result<Option<ActiveSession>> {
    let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) else {
        return Ok(None);
    };
    let id = state.sessions.hash(&token);

    let found = run_db(state, {
        let id = id.clone();
        move |db| db.get_session(&id, Utc::now())
    })
    .await?;

    Ok(found.map(|lookup| ActiveSession {
        id,
        user_id: lookup.user_id,
        user: lookup.user.map(User::from),
    }))
}

/// The logged-in user, if the cookie names a live session.
pub async fn current_user(state: &AppState, jar: &CookieJar) -> Result<Option<User>> {
    Ok(lookup(state, jar).await?.and_then(|session| session.user))
}

pub async fn destroy(state: &AppState, id: String) -> Result<()> {
    run_db(state, move |db| db.delete_session(&id)).await?;
    Ok(())
}

/// Jar with the session cookie expired.
pub fn clear_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_random_and_url_safe() {
        let a = SessionConfig::generate_token();
        let b = SessionConfig::generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hash_depends_on_secret() {
        let one = SessionConfig::new(b"first-secret", false).unwrap();
        let two = SessionConfig::new(b"second-secret", false).unwrap();

        assert_eq!(one.hash("token"), one.hash("token"));
        assert_ne!(one.hash("token"), two.hash("token"));
        assert_ne!(one.hash("token"), "token");
        assert_eq!(one.hash("token").len(), 64);
    }

    #[test]
    fn cookie_attributes() {
        let config = SessionConfig::new(b"secret", true).unwrap();
        let cookie = config.cookie("abc".into());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(2)));
    }
}
