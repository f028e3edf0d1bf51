// src/services/free_pool.rs

//! Process-wide set of question ids visible to non-premium users.
//!
//! The set lives behind an [`ArcSwap`]: readers load a snapshot without
//! locking, the refresh job builds a whole new set and stores it in one step.
//! A reader therefore sees either the previous pool or the new one, never a mix.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
    time::Duration,
};

use arc_swap::ArcSwap;
use rand::{rng, seq::SliceRandom};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    config::FREE_QUESTIONS_PER_CATEGORY,
    error::AppError,
    models::question::Category,
    store::QuestionCatalog,
};

pub struct FreeQuestionPool {
    ids: ArcSwap<HashSet<i64>>,
    catalog: Arc<dyn QuestionCatalog>,
}

impl FreeQuestionPool {
    /// Starts empty; the first refresh fills it.
    pub fn new(catalog: Arc<dyn QuestionCatalog>) -> Self {
        Self {
            ids: ArcSwap::from_pointee(HashSet::new()),
            catalog,
        }
    }

    pub fn contains(&self, question_id: i64) -> bool {
        self.ids.load().contains(&question_id)
    }

    /// Snapshot of the current pool.
    pub fn ids(&self) -> Arc<HashSet<i64>> {
        self.ids.load_full()
    }

    /// Rebuilds the pool from the accepted questions and swaps it in.
    ///
    /// On failure the previous pool stays in place.
    pub async fn refresh(&self) -> Result<usize, AppError> {
        let accepted = self.catalog.accepted_by_category().await.map_err(|e| {
            error!(error = %e, "Free question pool refresh failed, keeping previous pool");
            e
        })?;

        let picked = pick_free_questions(accepted, FREE_QUESTIONS_PER_CATEGORY);
        let size = picked.len();
        self.ids.store(Arc::new(picked));

        info!(size, "Refreshed free question pool");
        Ok(size)
    }
}

/// Shuffles each category's questions and keeps at most `per_category` of them.
fn pick_free_questions(accepted: Vec<(Category, i64)>, per_category: usize) -> HashSet<i64> {
    let mut by_category: BTreeMap<Category, Vec<i64>> = BTreeMap::new();
    for (category, id) in accepted {
        by_category.entry(category).or_default().push(id);
    }

    let mut rng = rng();
    by_category
        .into_values()
        .flat_map(|mut ids| {
            ids.shuffle(&mut rng);
            ids.truncate(per_category);
            ids
        })
        .collect()
}

/// Spawns the periodic refresh. The first tick fires immediately, which is
/// the eager refresh at startup.
///
/// Returns a CancellationToken that can be used to stop the task.
pub fn spawn_refresh_job(pool: Arc<FreeQuestionPool>, every: Duration) -> CancellationToken {
    // `interval` panics on a zero period.
    let every = every.max(Duration::from_secs(1));
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = every.as_secs(), "Free question refresh job started");

        loop {
            tokio::select! {
                _ = cancel_clone.cancelled() => {
                    info!("Free question refresh job shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // Failures are logged inside refresh and the old pool is kept.
                    let _ = pool.refresh().await;
                }
            }
        }
    });

    cancel
}
