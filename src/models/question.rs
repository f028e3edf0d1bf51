// src/models/question.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// Subject category a question (and a mock exam) belongs to.
/// Stored as its SCREAMING_SNAKE_CASE name in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    AirLaw,
    AirframeSystems,
    Instrumentation,
    MassAndBalance,
    Performance,
    FlightPlanning,
    HumanPerformance,
    Meteorology,
    GeneralNavigation,
    RadioNavigation,
    OperationalProcedures,
    PrinciplesOfFlight,
    VfrCommunications,
    IfrCommunications,
}

impl Category {
    pub const ALL: [Category; 14] = [
        Category::AirLaw,
        Category::AirframeSystems,
        Category::Instrumentation,
        Category::MassAndBalance,
        Category::Performance,
        Category::FlightPlanning,
        Category::HumanPerformance,
        Category::Meteorology,
        Category::GeneralNavigation,
        Category::RadioNavigation,
        Category::OperationalProcedures,
        Category::PrinciplesOfFlight,
        Category::VfrCommunications,
        Category::IfrCommunications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::AirLaw => "AIR_LAW",
            Category::AirframeSystems => "AIRFRAME_SYSTEMS",
            Category::Instrumentation => "INSTRUMENTATION",
            Category::MassAndBalance => "MASS_AND_BALANCE",
            Category::Performance => "PERFORMANCE",
            Category::FlightPlanning => "FLIGHT_PLANNING",
            Category::HumanPerformance => "HUMAN_PERFORMANCE",
            Category::Meteorology => "METEOROLOGY",
            Category::GeneralNavigation => "GENERAL_NAVIGATION",
            Category::RadioNavigation => "RADIO_NAVIGATION",
            Category::OperationalProcedures => "OPERATIONAL_PROCEDURES",
            Category::PrinciplesOfFlight => "PRINCIPLES_OF_FLIGHT",
            Category::VfrCommunications => "VFR_COMMUNICATIONS",
            Category::IfrCommunications => "IFR_COMMUNICATIONS",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown category '{}'", s))
    }
}

/// Publication status of a question. Only `Accepted` questions are ever served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionStatus {
    Accepted,
    Declined,
    Pending,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Accepted => "ACCEPTED",
            QuestionStatus::Declined => "DECLINED",
            QuestionStatus::Pending => "PENDING",
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// Category name, see [`Category::as_str`].
    pub category: String,

    /// Publication status name, see [`QuestionStatus::as_str`].
    pub status: String,

    /// The text content of the question.
    pub content: String,

    /// List of options (e.g., ["Option A", "Option B"]).
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// The correct answer key or content.
    pub answer: String,

    /// Explanation or analysis of the correct answer.
    pub analysis: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Question {
    /// Simple strict string matching against the answer key.
    pub fn is_correct(&self, submitted: &str) -> bool {
        self.answer == submitted
    }
}
