use shared_config::AppConfig;

use crate::pool::DatabasePool;

/// Shared application state handed to every router.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DatabasePool,
}

impl AppState {
    pub fn new(config: AppConfig, db: DatabasePool) -> Self {
        Self { config, db }
    }
}
