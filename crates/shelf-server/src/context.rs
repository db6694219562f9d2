//! Shared application context.

use std::sync::Arc;

use shelf_core::config::Config;
use shelf_db::DbPool;

use crate::citation::{CitationDisabled, CitationEngine};
use crate::repository::{AssetRepository, Repository};
use crate::session::SessionManager;
use crate::telemetry::UsageBus;

/// Shared state handed to every handler.
///
/// Cheap to clone; all collaborators sit behind `Arc`s.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub repository: Arc<dyn Repository>,
    pub citation: Arc<dyn CitationEngine>,
    pub telemetry: Arc<UsageBus>,
    pub sessions: Arc<SessionManager>,
}

impl AppContext {
    /// Wire up the default collaborators for a config and pool.
    pub fn new(config: Config, pool: DbPool) -> Self {
        let telemetry = Arc::new(UsageBus::new(config.delivery.telemetry_capacity));
        let repository = Arc::new(AssetRepository::new(&config.server.assetstore));
        Self {
            config: Arc::new(config),
            repository,
            citation: Arc::new(CitationDisabled),
            telemetry,
            sessions: Arc::new(SessionManager::new(pool)),
        }
    }

    /// Swap in a different citation engine.
    pub fn with_citation(mut self, engine: Arc<dyn CitationEngine>) -> Self {
        self.citation = engine;
        self
    }
}
