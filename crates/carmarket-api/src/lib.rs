pub mod applications;
pub mod auth;
pub mod cars;
pub mod error;
pub mod extract;
pub mod favorites;
pub mod guard;
pub mod messages;
pub mod middleware;
pub mod session;
pub mod state;
pub mod users;

#[cfg(test)]
mod tests;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post, put},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

use crate::middleware::{require_admin, require_auth, require_staff};

/// Every REST route under `/api`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout))
        .route("/api/user", get(auth::me))
        .route("/api/cars", get(cars::list_cars))
        .route("/api/cars/{id}", get(cars::get_car));

    let user_routes = Router::new()
        .route("/api/my-cars", get(cars::my_cars))
        .route("/api/cars/{id}", put(cars::update_car).delete(cars::delete_car))
        .route("/api/car-applications", post(applications::submit))
        .route("/api/applications", get(applications::list))
        .route("/api/favorites", get(favorites::list).post(favorites::toggle))
        .route("/api/favorites/{car_id}", get(favorites::status).delete(favorites::remove))
        .route("/api/messages", get(messages::list_messages).post(messages::send_message))
        .route("/api/messages/unread-count", get(messages::unread_count))
        .route("/api/messages/read", post(messages::mark_conversation_read))
        .route("/api/messages/car/{car_id}/{user_id}", get(messages::conversation))
        .route("/api/messages/{id}/read", patch(messages::mark_read))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let staff_routes = Router::new()
        .route("/api/cars", post(cars::create_car))
        .route("/api/cars/{id}/status", patch(cars::update_car_status))
        .route("/api/applications/pending", get(applications::pending))
        .route("/api/applications/{id}", patch(applications::review))
        .route("/api/messages/{id}", delete(messages::delete_message))
        .route_layer(from_fn(require_staff))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/api/users", get(users::list_users))
        .route("/api/users/{id}", patch(users::update_user).delete(users::delete_user))
        .route("/api/users/{id}/role", patch(users::update_role))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(staff_routes)
        .merge(admin_routes)
        .with_state(state)
}
