// src/store/memory.rs

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use async_trait::async_trait;
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        exam_session::{ExamSession, SessionStatus},
        question::{Category, Question, QuestionStatus},
    },
    store::{QuestionCatalog, SessionStore},
};

/// In-process session store.
///
/// `fail_next_updates` makes the next N `update` calls fail, which is how a
/// store outage is simulated.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, ExamSession>>,
    failing_updates: AtomicU32,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_updates(&self, count: u32) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// Inserts or replaces a session without any check, as a restored database would.
    pub async fn insert(&self, session: ExamSession) {
        self.sessions.write().await.insert(session.id, session);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &ExamSession) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(AppError::InternalServerError(format!(
                "Session {} already exists",
                session.id
            )));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ExamSession>, AppError> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn get_ongoing_by_user(&self, user_id: i64) -> Result<Option<ExamSession>, AppError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.user_id == user_id && s.status == SessionStatus::Ongoing)
            .cloned())
    }

    async fn list_all_ongoing(&self) -> Result<Vec<ExamSession>, AppError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.status == SessionStatus::Ongoing)
            .cloned()
            .collect())
    }

    async fn update(&self, session: &ExamSession) -> Result<(), AppError> {
        let failing = self
            .failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(AppError::InternalServerError("session store unavailable".to_string()));
        }

        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Session {} not found", session.id))),
        }
    }

    async fn list_finished_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExamSession>, AppError> {
        let mut finished: Vec<ExamSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id && s.status == SessionStatus::Finished)
            .cloned()
            .collect();
        finished.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        Ok(finished
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_finished_by_user(&self, user_id: i64) -> Result<i64, AppError> {
        let count = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id && s.status == SessionStatus::Finished)
            .count();
        Ok(count as i64)
    }
}

/// In-process question catalog. `set_unavailable(true)` makes every query fail.
#[derive(Default)]
pub struct MemoryQuestionCatalog {
    questions: RwLock<Vec<Question>>,
    unavailable: AtomicBool,
}

fn is_published(question: &Question) -> bool {
    question.status == QuestionStatus::Accepted.as_str()
}

impl MemoryQuestionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a question and returns its id (ids start at 1).
    pub async fn insert(&self, category: Category, status: QuestionStatus, answer: &str) -> i64 {
        let mut questions = self.questions.write().await;
        let id = questions.len() as i64 + 1;
        questions.push(Question {
            id,
            category: category.as_str().to_string(),
            status: status.as_str().to_string(),
            content: format!("Question {id}"),
            options: Json(Vec::new()),
            answer: answer.to_string(),
            analysis: None,
            created_at: None,
        });
        id
    }

    pub async fn insert_accepted(&self, category: Category, answer: &str) -> i64 {
        self.insert(category, QuestionStatus::Accepted, answer).await
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError("question catalog unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl QuestionCatalog for MemoryQuestionCatalog {
    async fn find_eligible(&self, category: Category, excluded: &[i64]) -> Result<Vec<i64>, AppError> {
        self.ensure_available()?;
        Ok(self
            .questions
            .read()
            .await
            .iter()
            .filter(|q| {
                q.category == category.as_str() && is_published(q) && !excluded.contains(&q.id)
            })
            .map(|q| q.id)
            .collect())
    }

    async fn is_accepted(&self, question_id: i64) -> Result<bool, AppError> {
        self.ensure_available()?;
        Ok(self
            .questions
            .read()
            .await
            .iter()
            .any(|q| q.id == question_id && is_published(q)))
    }

    async fn check_answer(&self, question_id: i64, submitted: &str) -> Result<bool, AppError> {
        self.ensure_available()?;
        self.questions
            .read()
            .await
            .iter()
            .find(|q| q.id == question_id)
            .map(|q| q.is_correct(submitted))
            .ok_or(AppError::NotFound("Question not found".to_string()))
    }

    async fn accepted_by_category(&self) -> Result<Vec<(Category, i64)>, AppError> {
        self.ensure_available()?;
        self.questions
            .read()
            .await
            .iter()
            .filter(|q| is_published(q))
            .map(|q| {
                q.category
                    .parse::<Category>()
                    .map(|c| (c, q.id))
                    .map_err(AppError::InternalServerError)
            })
            .collect()
    }
}
