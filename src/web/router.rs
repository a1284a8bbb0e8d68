use axum::{
    Router,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::web::{AppState, auth, error, students};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(students::index).post(students::create_student))
        .route(
            "/update/:id",
            get(students::update_page).post(students::process_update),
        )
        .route("/delete/:id", post(students::delete_student))
        .route(
            "/register",
            get(auth::register_page).post(auth::process_register),
        )
        .route("/login", get(auth::login_page).post(auth::process_login))
        .route("/logout", get(auth::logout))
        .route("/healthz", get(healthz))
        .fallback(error::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error::personalize_error_pages,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
