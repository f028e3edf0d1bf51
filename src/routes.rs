// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, patch, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{free_questions, mock_exam},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges the mock exam, free question and admin sub-routers.
/// * Every route requires a bearer token; admin routes additionally require the admin role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let mock_exam_routes = Router::new()
        .route(
            "/mock-exams",
            post(mock_exam::start_session).get(mock_exam::list_history),
        )
        .route("/mock-exam", get(mock_exam::current_session))
        .route("/mock-exam/next", get(mock_exam::next_question))
        .route("/mock-exam/answer", post(mock_exam::submit_answer))
        .route("/mock-exam/stop", patch(mock_exam::stop_session))
        .route("/mock-exam/{id}", get(mock_exam::get_session));

    let free_question_routes = Router::new()
        .route("/", get(free_questions::list_free_questions))
        .route("/{id}", get(free_questions::check_free_question));

    let admin_routes = Router::new()
        .route(
            "/free-questions/refresh",
            post(free_questions::refresh_free_questions),
        )
        .layer(middleware::from_fn(admin_middleware));

    let api = Router::new()
        .merge(mock_exam_routes)
        .nest("/free-questions", free_question_routes)
        .nest("/admin", admin_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api", api)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
