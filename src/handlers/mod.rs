// src/handlers/mod.rs

pub mod free_questions;
pub mod mock_exam;
