use std::sync::Arc;

use crate::config::ServerConfig;
use crate::db;
use crate::db::pool::{DbPool, open_pool};
use crate::error::ApiError;

/// Shared application state, handed to route handlers via
/// `axum::extract::State`.
pub struct AppState {
    pub config: ServerConfig,
    pub pool: DbPool,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, ApiError> {
        let pool = open_pool(&config.db_path, config.pool_size)?;
        db::init_schema(&*pool.get()?)?;
        Ok(Arc::new(Self { config, pool }))
    }
}
