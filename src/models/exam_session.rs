// src/models/exam_session.rs

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::{MAX_EXAM_DURATION_SECS, MAX_EXAM_QUESTIONS, MIN_EXAM_DURATION_SECS, MIN_EXAM_QUESTIONS},
    models::question::Category,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Ongoing,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Ongoing => "ONGOING",
            SessionStatus::Finished => "FINISHED",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONGOING" => Ok(SessionStatus::Ongoing),
            "FINISHED" => Ok(SessionStatus::Finished),
            other => Err(format!("Unknown session status '{}'", other)),
        }
    }
}

/// One answered question inside a mock exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question_id: i64,
    pub answer: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// A timed attempt at answering a bounded number of questions of one category.
///
/// Stored in the 'exam_sessions' table, with `answers` kept as a JSON array on the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: Uuid,
    pub user_id: i64,
    pub category: Category,
    pub status: SessionStatus,
    pub max_questions: i32,
    pub max_duration_ms: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Placeholder of 1.0 while ongoing, frozen when the session finishes.
    pub correctness_ratio: f64,

    /// `None` once finished or when no eligible question remains.
    pub current_question_id: Option<i64>,
    pub answers: Vec<AnswerEntry>,
}

impl ExamSession {
    pub fn new(
        user_id: i64,
        category: Category,
        max_questions: i32,
        max_duration: TimeDelta,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            category,
            status: SessionStatus::Ongoing,
            max_questions,
            max_duration_ms: max_duration.num_milliseconds(),
            started_at: now,
            ended_at: None,
            correctness_ratio: 1.0,
            current_question_id: None,
            answers: Vec::new(),
        }
    }

    pub fn max_duration(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.max_duration_ms)
    }

    /// Instant at which the time budget runs out.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + self.max_duration()
    }

    pub fn is_finished(&self) -> bool {
        self.status == SessionStatus::Finished
    }

    pub fn has_next_question(&self) -> bool {
        self.answers.len() < self.max_questions.max(0) as usize
    }

    pub fn has_time_remaining(&self, now: DateTime<Utc>) -> bool {
        now - self.started_at < self.max_duration()
    }

    pub fn answered_ids(&self) -> Vec<i64> {
        self.answers.iter().map(|a| a.question_id).collect()
    }

    /// Correct answers divided by the question budget, not by the number answered.
    pub fn process_correctness_ratio(&self) -> f64 {
        if self.max_questions <= 0 {
            return 0.0;
        }
        let correct = self.answers.iter().filter(|a| a.is_correct).count();
        correct as f64 / self.max_questions as f64
    }

    /// Transitions to FINISHED. `ended_at` never precedes `started_at`.
    pub fn mark_finished(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Finished;
        self.correctness_ratio = self.process_correctness_ratio();
        self.ended_at = Some(now.max(self.started_at));
        self.current_question_id = None;
    }
}

/// DTO for starting a mock exam.
#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    pub category: Category,
    #[validate(range(min = MIN_EXAM_QUESTIONS, max = MAX_EXAM_QUESTIONS))]
    pub max_questions: i32,
    #[validate(range(min = MIN_EXAM_DURATION_SECS, max = MAX_EXAM_DURATION_SECS))]
    pub time_limit_secs: i64,
}

/// DTO for answering the current question of the ongoing mock exam.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    #[validate(length(min = 1, max = 500))]
    pub answer: String,
}

/// Result of an answer submission.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    /// `None` when the submission finished the session.
    pub next_question_id: Option<i64>,
    pub session: ExamSession,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
}

/// One page of finished mock exams, with the total count for pagination.
#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub items: Vec<ExamSession>,
    pub total: i64,
}
