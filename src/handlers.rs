use crate::errors::AppError;
use crate::models::{
    AuthResponse, DashboardResponse, LoginRequest, NutritionEntry, RegisterRequest, SaveResponse,
    SleepEntry, WorkoutUpdate,
};
use crate::state::AppState;
use crate::ui::render_dashboard;
use axum::{Json, extract::State, response::Html};

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_dashboard(&state.dashboard.snapshot()))
}

pub async fn get_dashboard(State(state): State<AppState>) -> Json<DashboardResponse> {
    Json(state.dashboard.snapshot().to_response())
}

pub async fn refresh_dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, AppError> {
    let snapshot = state.dashboard.refresh().await?;
    Ok(Json(snapshot.to_response()))
}

pub async fn log_workout(
    State(state): State<AppState>,
    Json(update): Json<WorkoutUpdate>,
) -> Result<Json<SaveResponse>, AppError> {
    state.store.record_workout(update).await?;
    Ok(Json(SaveResponse { status: "saved" }))
}

pub async fn log_sleep(
    State(state): State<AppState>,
    Json(entry): Json<SleepEntry>,
) -> Result<Json<SaveResponse>, AppError> {
    state.store.record_sleep(entry).await?;
    Ok(Json(SaveResponse { status: "saved" }))
}

pub async fn log_nutrition(
    State(state): State<AppState>,
    Json(entry): Json<NutritionEntry>,
) -> Result<Json<SaveResponse>, AppError> {
    state.store.record_nutrition(entry).await?;
    Ok(Json(SaveResponse { status: "saved" }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user_id = state
        .identity
        .sign_up(&request.name, &request.email, &request.password)
        .await?;
    Ok(Json(AuthResponse { user_id }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user_id = state
        .identity
        .sign_in(&request.email, &request.password)
        .await?;
    Ok(Json(AuthResponse { user_id }))
}
