use crate::{config::AppConfig, engine::QueryEngine};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: QueryEngine,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, engine: QueryEngine) -> Self {
        Self { config, engine }
    }
}
