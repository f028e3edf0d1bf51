use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    services::{engine::MockExamEngine, free_pool::FreeQuestionPool},
    store::QuestionCatalog,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<MockExamEngine>,
    pub free_pool: Arc<FreeQuestionPool>,
    pub catalog: Arc<dyn QuestionCatalog>,
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<MockExamEngine> {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

impl FromRef<AppState> for Arc<FreeQuestionPool> {
    fn from_ref(state: &AppState) -> Self {
        state.free_pool.clone()
    }
}
