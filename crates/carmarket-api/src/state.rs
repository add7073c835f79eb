use std::sync::Arc;

use tracing::error;

use carmarket_db::Database;
use carmarket_gateway::Dispatcher;

use crate::error::ApiError;
use crate::guard::LoginGuard;
use crate::session::SessionConfig;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub sessions: SessionConfig,
    pub guard: LoginGuard,
    /// Take the client address from `X-Forwarded-For` instead of the socket.
    pub trust_proxy: bool,
}

impl AppStateInner {
    pub fn new(db: Database, dispatcher: Dispatcher, sessions: SessionConfig, trust_proxy: bool) -> AppState {
        Arc::new(Self {
            db,
            dispatcher,
            sessions,
            guard: LoginGuard::new(),
            trust_proxy,
        })
    }
}

/// Run blocking DB work off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
        .map_err(ApiError::Internal)
}
