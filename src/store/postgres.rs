// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        exam_session::{AnswerEntry, ExamSession},
        question::{Category, Question, QuestionStatus},
    },
    store::{QuestionCatalog, SessionStore},
};

const SESSION_COLUMNS: &str = r#"
    id, user_id, category, status, max_questions, max_duration_ms,
    started_at, ended_at, correctness_ratio, current_question_id, answers
"#;

/// Raw 'exam_sessions' row; enums are stored by name.
#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: i64,
    category: String,
    status: String,
    max_questions: i32,
    max_duration_ms: i64,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    correctness_ratio: f64,
    current_question_id: Option<i64>,
    answers: Json<Vec<AnswerEntry>>,
}

impl TryFrom<SessionRow> for ExamSession {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(ExamSession {
            id: row.id,
            user_id: row.user_id,
            category: row.category.parse().map_err(AppError::InternalServerError)?,
            status: row.status.parse().map_err(AppError::InternalServerError)?,
            max_questions: row.max_questions,
            max_duration_ms: row.max_duration_ms,
            started_at: row.started_at,
            ended_at: row.ended_at,
            correctness_ratio: row.correctness_ratio,
            current_question_id: row.current_question_id,
            answers: row.answers.0,
        })
    }
}

fn into_sessions(rows: Vec<SessionRow>) -> Result<Vec<ExamSession>, AppError> {
    rows.into_iter().map(ExamSession::try_from).collect()
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: &ExamSession) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO exam_sessions (
                id, user_id, category, status, max_questions, max_duration_ms,
                started_at, ended_at, correctness_ratio, current_question_id, answers
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.category.as_str())
        .bind(session.status.as_str())
        .bind(session.max_questions)
        .bind(session.max_duration_ms)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.correctness_ratio)
        .bind(session.current_question_id)
        .bind(Json(session.answers.clone()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create exam session: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ExamSession>, AppError> {
        let sql = format!("SELECT {} FROM exam_sessions WHERE id = $1", SESSION_COLUMNS);
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ExamSession::try_from).transpose()
    }

    async fn get_ongoing_by_user(&self, user_id: i64) -> Result<Option<ExamSession>, AppError> {
        let sql = format!(
            "SELECT {} FROM exam_sessions WHERE user_id = $1 AND status = 'ONGOING' LIMIT 1",
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ExamSession::try_from).transpose()
    }

    async fn list_all_ongoing(&self) -> Result<Vec<ExamSession>, AppError> {
        let sql = format!(
            "SELECT {} FROM exam_sessions WHERE status = 'ONGOING'",
            SESSION_COLUMNS
        );
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        into_sessions(rows)
    }

    async fn update(&self, session: &ExamSession) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE exam_sessions SET
                status = $2,
                ended_at = $3,
                correctness_ratio = $4,
                current_question_id = $5,
                answers = $6
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.status.as_str())
        .bind(session.ended_at)
        .bind(session.correctness_ratio)
        .bind(session.current_question_id)
        .bind(Json(session.answers.clone()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update exam session {}: {:?}", session.id, e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(())
    }

    async fn list_finished_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExamSession>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM exam_sessions
            WHERE user_id = $1 AND status = 'FINISHED'
            ORDER BY started_at DESC
            LIMIT $2 OFFSET $3
            "#,
            SESSION_COLUMNS
        );
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        into_sessions(rows)
    }

    async fn count_finished_by_user(&self, user_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM exam_sessions WHERE user_id = $1 AND status = 'FINISHED'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[derive(Clone)]
pub struct PgQuestionCatalog {
    pool: PgPool,
}

impl PgQuestionCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionCatalog for PgQuestionCatalog {
    async fn find_eligible(&self, category: Category, excluded: &[i64]) -> Result<Vec<i64>, AppError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM questions
            WHERE category = $1
              AND status = $2
              AND NOT (id = ANY($3))
            "#,
        )
        .bind(category.as_str())
        .bind(QuestionStatus::Accepted.as_str())
        .bind(excluded)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch eligible questions: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(ids)
    }

    async fn is_accepted(&self, question_id: i64) -> Result<bool, AppError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM questions WHERE id = $1")
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(status.as_deref() == Some(QuestionStatus::Accepted.as_str()))
    }

    async fn check_answer(&self, question_id: i64, submitted: &str) -> Result<bool, AppError> {
        let question = sqlx::query_as::<_, Question>(
            "SELECT id, category, status, content, options, answer, analysis, created_at \
             FROM questions WHERE id = $1",
        )
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

        Ok(question.is_correct(submitted))
    }

    async fn accepted_by_category(&self) -> Result<Vec<(Category, i64)>, AppError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT category, id FROM questions WHERE status = $1")
                .bind(QuestionStatus::Accepted.as_str())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(category, id)| {
                category
                    .parse::<Category>()
                    .map(|c| (c, id))
                    .map_err(AppError::InternalServerError)
            })
            .collect()
    }
}
