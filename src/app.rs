use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/dashboard", get(handlers::get_dashboard))
        .route("/api/dashboard/refresh", post(handlers::refresh_dashboard))
        .route("/api/workout", post(handlers::log_workout))
        .route("/api/sleep", post(handlers::log_sleep))
        .route("/api/nutrition", post(handlers::log_nutrition))
        .route("/api/register", post(handlers::register))
        .route("/api/login", post(handlers::login))
        .with_state(state)
}
