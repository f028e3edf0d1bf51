// src/handlers/mock_exam.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::TimeDelta;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::exam_session::{HistoryQuery, StartSessionRequest, SubmitAnswerRequest},
    services::engine::MockExamEngine,
    utils::jwt::Claims,
};

/// Starts a mock exam for the caller.
///
/// * Validates the question budget and time limit.
/// * Fails with 409 if the caller already has an ongoing mock exam.
pub async fn start_session(
    State(engine): State<Arc<MockExamEngine>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = req.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let session = engine
        .start(
            claims.user_id()?,
            req.category,
            req.max_questions,
            TimeDelta::seconds(req.time_limit_secs),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// Lists the caller's finished mock exams, newest first.
pub async fn list_history(
    State(engine): State<Arc<MockExamEngine>>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = engine
        .history(claims.user_id()?, query.page.unwrap_or(1))
        .await?;

    Ok(Json(page))
}

/// Returns the caller's ongoing mock exam.
pub async fn current_session(
    State(engine): State<Arc<MockExamEngine>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let session = engine
        .current_session(claims.user_id()?)
        .await?
        .ok_or(AppError::NoOngoingSession)?;

    Ok(Json(session))
}

/// Returns the id of the question to answer next in the caller's ongoing mock exam.
pub async fn next_question(
    State(engine): State<Arc<MockExamEngine>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let session = engine
        .current_session(claims.user_id()?)
        .await?
        .ok_or(AppError::NoOngoingSession)?;
    let question_id = session
        .current_question_id
        .ok_or(AppError::NotFound("No question left in this mock exam".to_string()))?;

    Ok(Json(serde_json::json!({ "question_id": question_id })))
}

/// Returns one mock exam. Only its owner or an admin may see it.
pub async fn get_session(
    State(engine): State<Arc<MockExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = engine
        .session_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Could not find the requested mock exam.".to_string()))?;

    if session.user_id != claims.user_id()? && !claims.is_admin() {
        return Err(AppError::Forbidden("You cannot access this mock exam".to_string()));
    }

    Ok(Json(session))
}

/// Answers the current question of the caller's ongoing mock exam.
pub async fn submit_answer(
    State(engine): State<Arc<MockExamEngine>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = req.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let outcome = engine
        .submit_answer(claims.user_id()?, req.question_id, &req.answer)
        .await?;

    Ok(Json(outcome))
}

/// Ends the caller's ongoing mock exam early.
pub async fn stop_session(
    State(engine): State<Arc<MockExamEngine>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let session = engine.stop(claims.user_id()?).await?;

    Ok(Json(session))
}
