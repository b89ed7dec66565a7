//! Shared application state passed to handlers and background tasks.

use std::sync::Arc;

use tokio::sync::Notify;

use crate::{config::Config, db::DbPool};

/// State shared by the axum router and the delivery worker.
///
/// Cloning is cheap: the pool is reference-counted internally and the
/// config is a small owned struct.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Config,

    /// Wakes the delivery worker when deliveries are enqueued, so they are
    /// picked up ahead of the next poll tick.
    pub worker_wake: Arc<Notify>,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> Self {
        Self {
            pool,
            config,
            worker_wake: Arc::new(Notify::new()),
        }
    }
}
