// src/store/mod.rs

//! Collaborator boundaries of the mock exam engine.
//!
//! The engine only talks to persistence through these two traits. `postgres`
//! backs them with sqlx, `memory` keeps everything in process (tests, local runs).

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{exam_session::ExamSession, question::Category},
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryQuestionCatalog, MemorySessionStore};
pub use postgres::{PgQuestionCatalog, PgSessionStore};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &ExamSession) -> Result<(), AppError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ExamSession>, AppError>;

    async fn get_ongoing_by_user(&self, user_id: i64) -> Result<Option<ExamSession>, AppError>;

    async fn list_all_ongoing(&self) -> Result<Vec<ExamSession>, AppError>;

    /// Writes every mutable field of the session in one statement.
    async fn update(&self, session: &ExamSession) -> Result<(), AppError>;

    /// Finished sessions of a user, newest first.
    async fn list_finished_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExamSession>, AppError>;

    async fn count_finished_by_user(&self, user_id: i64) -> Result<i64, AppError>;
}

#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    /// Accepted questions of `category` whose id is not in `excluded`.
    async fn find_eligible(&self, category: Category, excluded: &[i64]) -> Result<Vec<i64>, AppError>;

    async fn is_accepted(&self, question_id: i64) -> Result<bool, AppError>;

    /// Fails with `NotFound` for an unknown question.
    async fn check_answer(&self, question_id: i64, submitted: &str) -> Result<bool, AppError>;

    /// Every accepted question as `(category, id)`.
    async fn accepted_by_category(&self) -> Result<Vec<(Category, i64)>, AppError>;
}
