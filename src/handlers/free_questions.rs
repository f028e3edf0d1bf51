// src/handlers/free_questions.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    error::AppError, services::free_pool::FreeQuestionPool, state::AppState, utils::jwt::Claims,
};

/// Lists the ids currently in the free question pool.
pub async fn list_free_questions(
    State(pool): State<Arc<FreeQuestionPool>>,
) -> Result<impl IntoResponse, AppError> {
    let mut ids: Vec<i64> = pool.ids().iter().copied().collect();
    ids.sort_unstable();

    Ok(Json(ids))
}

/// Tells whether a question is in the free pool and whether the caller may open it.
///
/// Premium callers can open every accepted question, others only the pool.
pub async fn check_free_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let free = state.free_pool.contains(id);
    let accepted = state.catalog.is_accepted(id).await?;
    let accessible = accepted && (claims.premium || free);

    Ok(Json(serde_json::json!({
        "question_id": id,
        "free": free,
        "accessible": accessible,
    })))
}

/// Rebuilds the free pool now instead of waiting for the daily job.
/// Admin only.
pub async fn refresh_free_questions(
    State(pool): State<Arc<FreeQuestionPool>>,
) -> Result<impl IntoResponse, AppError> {
    let size = pool.refresh().await?;

    Ok(Json(serde_json::json!({
        "size": size,
        "message": "Free question pool refreshed"
    })))
}
