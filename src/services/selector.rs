// src/services/selector.rs

use std::sync::Arc;

use rand::{rng, seq::IndexedRandom};

use crate::{error::AppError, models::question::Category, store::QuestionCatalog};

/// Picks the next question of a mock exam.
///
/// The catalog filters by category, status and exclusion in one query; the
/// selector only draws uniformly among what comes back.
#[derive(Clone)]
pub struct QuestionSelector {
    catalog: Arc<dyn QuestionCatalog>,
}

impl QuestionSelector {
    pub fn new(catalog: Arc<dyn QuestionCatalog>) -> Self {
        Self { catalog }
    }

    /// Returns `None` iff no eligible question remains.
    pub async fn next(&self, category: Category, excluded: &[i64]) -> Result<Option<i64>, AppError> {
        let candidates: Vec<i64> = self
            .catalog
            .find_eligible(category, excluded)
            .await?
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .collect();

        Ok(candidates.choose(&mut rng()).copied())
    }
}
