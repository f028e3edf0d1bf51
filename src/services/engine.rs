// src/services/engine.rs

//! Mock exam state machine.
//!
//! The engine is the only component that changes a session's status. Every
//! operation of a user runs under that user's lock, and there is at most one
//! ongoing session per user, so two paths racing on the same session (an
//! answer and the deadline) are serialized. Finishing is idempotent: whoever
//! comes second sees FINISHED and does nothing.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, Weak},
    time::Duration,
};

use async_trait::async_trait;
use chrono::TimeDelta;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    config::HISTORY_PAGE_SIZE,
    error::AppError,
    models::{
        exam_session::{AnswerEntry, AnswerOutcome, ExamSession, HistoryPage},
        question::Category,
    },
    services::{
        clock::Clock,
        selector::QuestionSelector,
        timer::{ExpiryHandler, SessionTimer},
    },
    store::{QuestionCatalog, SessionStore},
};

pub struct MockExamEngine {
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn QuestionCatalog>,
    selector: QuestionSelector,
    clock: Arc<dyn Clock>,
    timer: SessionTimer,
    user_locks: UserLocks,
}

type UserLocks = StdMutex<HashMap<i64, Arc<Mutex<()>>>>;

/// Holds a user's lock. On drop the map entry is removed once nobody else
/// holds or waits for it.
struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user_id);
        }
    }
}

impl MockExamEngine {
    /// Builds the engine and spawns its session timer. Must run inside a tokio runtime.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        catalog: Arc<dyn QuestionCatalog>,
        clock: Arc<dyn Clock>,
        timer_retry_backoff: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|engine: &Weak<Self>| {
            let handler: Weak<dyn ExpiryHandler> = engine.clone();
            let timer = SessionTimer::spawn(handler, clock.clone(), timer_retry_backoff);

            Self {
                sessions,
                selector: QuestionSelector::new(catalog.clone()),
                catalog,
                clock,
                timer,
                user_locks: StdMutex::new(HashMap::new()),
            }
        })
    }

    async fn lock_user(&self, user_id: i64) -> UserGuard<'_> {
        let lock = self
            .user_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(user_id)
            .or_default()
            .clone();

        UserGuard {
            locks: &self.user_locks,
            user_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.user_locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn load(&self, session_id: Uuid) -> Result<ExamSession, AppError> {
        self.sessions
            .get_by_id(session_id)
            .await?
            .ok_or(AppError::NotFound("Could not find the requested mock exam.".to_string()))
    }

    /// Creates a session, picks its first question and arms its deadline.
    ///
    /// A category without eligible questions still yields a valid session,
    /// with no current question.
    pub async fn start(
        &self,
        user_id: i64,
        category: Category,
        max_questions: i32,
        max_duration: TimeDelta,
    ) -> Result<ExamSession, AppError> {
        let _guard = self.lock_user(user_id).await;

        if self.sessions.get_ongoing_by_user(user_id).await?.is_some() {
            return Err(AppError::AlreadyOngoing);
        }

        let mut session =
            ExamSession::new(user_id, category, max_questions, max_duration, self.clock.now());
        session.current_question_id = self.selector.next(category, &[]).await?;

        self.sessions.create(&session).await?;
        self.timer.arm(session.id, session.deadline());

        info!(
            session_id = %session.id,
            user_id,
            %category,
            max_questions,
            max_duration_ms = session.max_duration_ms,
            "Mock exam started"
        );
        Ok(session)
    }

    /// Records an answer to the current question, then either moves to the
    /// next question or finishes the session.
    pub async fn advance(
        &self,
        session: &ExamSession,
        question_id: i64,
        answer: &str,
    ) -> Result<(bool, ExamSession), AppError> {
        let _guard = self.lock_user(session.user_id).await;
        self.advance_locked(session.id, question_id, answer).await
    }

    async fn advance_locked(
        &self,
        session_id: Uuid,
        question_id: i64,
        answer: &str,
    ) -> Result<(bool, ExamSession), AppError> {
        // Re-read under the lock: the deadline may have finished it meanwhile.
        let mut session = self.load(session_id).await?;

        if session.is_finished() {
            return Err(AppError::SessionFinished);
        }
        if session.current_question_id != Some(question_id) {
            return Err(AppError::QuestionMismatch {
                expected: session.current_question_id,
                submitted: question_id,
            });
        }

        let is_correct = self.catalog.check_answer(question_id, answer).await?;
        let now = self.clock.now();
        session.answers.push(AnswerEntry {
            question_id,
            answer: answer.to_string(),
            is_correct,
            answered_at: now,
        });

        // Continue only if budget, time and pool all allow it.
        let next = if session.has_next_question() && session.has_time_remaining(now) {
            self.selector
                .next(session.category, &session.answered_ids())
                .await?
        } else {
            None
        };

        let session = match next {
            Some(next_id) => {
                session.current_question_id = Some(next_id);
                self.sessions.update(&session).await?;
                debug!(
                    session_id = %session.id,
                    answered = session.answers.len(),
                    next_question_id = next_id,
                    "Mock exam advanced"
                );
                session
            }
            None => self.finish_locked(session).await?,
        };

        Ok((is_correct, session))
    }

    /// Finishes the session. Calling it on a finished session returns the
    /// stored record untouched.
    pub async fn finish(&self, session: &ExamSession) -> Result<ExamSession, AppError> {
        let _guard = self.lock_user(session.user_id).await;
        let fresh = self.load(session.id).await?;
        self.finish_locked(fresh).await
    }

    async fn finish_locked(&self, mut session: ExamSession) -> Result<ExamSession, AppError> {
        if session.is_finished() {
            return Ok(session);
        }

        session.mark_finished(self.clock.now());
        self.sessions.update(&session).await?;
        self.timer.cancel(session.id);

        info!(
            session_id = %session.id,
            user_id = session.user_id,
            answered = session.answers.len(),
            correctness_ratio = session.correctness_ratio,
            "Mock exam finished"
        );
        Ok(session)
    }

    /// Finishes the caller's ongoing session.
    pub async fn stop(&self, user_id: i64) -> Result<ExamSession, AppError> {
        let _guard = self.lock_user(user_id).await;
        let ongoing = self
            .sessions
            .get_ongoing_by_user(user_id)
            .await?
            .ok_or(AppError::NoOngoingSession)?;
        self.finish_locked(ongoing).await
    }

    /// Re-arms the deadline of every session still ongoing. Run once at startup;
    /// deadlines that passed while the process was down fire right away.
    pub async fn recover_on_startup(&self) -> Result<usize, AppError> {
        let ongoing = self.sessions.list_all_ongoing().await?;
        for session in &ongoing {
            self.timer.arm(session.id, session.deadline());
        }

        info!(count = ongoing.len(), "Re-armed ongoing mock exam timers");
        Ok(ongoing.len())
    }

    /// Answers the current question of the user's ongoing session.
    pub async fn submit_answer(
        &self,
        user_id: i64,
        question_id: i64,
        answer: &str,
    ) -> Result<AnswerOutcome, AppError> {
        let _guard = self.lock_user(user_id).await;
        let ongoing = self
            .sessions
            .get_ongoing_by_user(user_id)
            .await?
            .ok_or(AppError::NoOngoingSession)?;

        let (is_correct, session) = self.advance_locked(ongoing.id, question_id, answer).await?;
        Ok(AnswerOutcome {
            is_correct,
            next_question_id: session.current_question_id,
            session,
        })
    }

    pub async fn current_session(&self, user_id: i64) -> Result<Option<ExamSession>, AppError> {
        self.sessions.get_ongoing_by_user(user_id).await
    }

    pub async fn session_by_id(&self, session_id: Uuid) -> Result<Option<ExamSession>, AppError> {
        self.sessions.get_by_id(session_id).await
    }

    /// Finished sessions of a user, newest first, `HISTORY_PAGE_SIZE` per page (pages start at 1).
    pub async fn history(&self, user_id: i64, page: i64) -> Result<HistoryPage, AppError> {
        let page = page.max(1);
        let items = self
            .sessions
            .list_finished_by_user(user_id, HISTORY_PAGE_SIZE, (page - 1) * HISTORY_PAGE_SIZE)
            .await?;
        let total = self.sessions.count_finished_by_user(user_id).await?;

        Ok(HistoryPage { items, total })
    }
}

#[async_trait]
impl ExpiryHandler for MockExamEngine {
    async fn on_expired(&self, session_id: Uuid) -> Result<(), AppError> {
        let Some(session) = self.sessions.get_by_id(session_id).await? else {
            error!(%session_id, "Could not retrieve expired mock exam");
            return Ok(());
        };

        if session.is_finished() {
            return Ok(());
        }

        self.finish(&session).await.map(|_| ())
    }
}

impl Drop for MockExamEngine {
    fn drop(&mut self) {
        self.timer.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::clock::TokioClock,
        store::{MemoryQuestionCatalog, MemorySessionStore},
    };

    async fn engine() -> Arc<MockExamEngine> {
        let catalog = Arc::new(MemoryQuestionCatalog::new());
        catalog.insert_accepted(Category::AirLaw, "A").await;
        MockExamEngine::new(
            Arc::new(MemorySessionStore::new()),
            catalog,
            Arc::new(TokioClock::new()),
            Duration::from_millis(100),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_locks_are_released() {
        let engine = engine().await;

        for user_id in 0..10 {
            engine
                .start(user_id, Category::AirLaw, 20, TimeDelta::minutes(5))
                .await
                .unwrap();
            engine.stop(user_id).await.unwrap();
        }
        assert_eq!(engine.tracked_users(), 0);

        let guard = engine.lock_user(1).await;
        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move {
                let _second = engine.lock_user(1).await;
            })
        };
        tokio::task::yield_now().await;

        // A waiter keeps the entry alive.
        drop(guard);
        assert_eq!(engine.tracked_users(), 1);

        waiter.await.unwrap();
        assert_eq!(engine.tracked_users(), 0);
    }
}
