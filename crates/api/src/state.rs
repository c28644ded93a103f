use std::sync::Arc;

use cascade_engine::{DispatchEngine, OrderLedger, TemplateService};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; inner data is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: cascade_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Status reports and the cascade trigger.
    pub ledger: OrderLedger,
    /// Root launches and resubmits.
    pub engine: Arc<DispatchEngine>,
    /// Execution template storage.
    pub templates: TemplateService,
}

impl AppState {
    /// Assemble state around an already-built engine.
    pub fn new(pool: cascade_db::DbPool, config: ServerConfig, engine: Arc<DispatchEngine>) -> Self {
        Self {
            ledger: OrderLedger::new(pool.clone(), Arc::clone(&engine)),
            templates: engine.templates().clone(),
            pool,
            config: Arc::new(config),
            engine,
        }
    }
}
