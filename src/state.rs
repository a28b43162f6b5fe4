//! Shared application state for all routes.

use crate::config::{RelationGraph, Settings};
use crate::controller::ResourceController;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub graph: Arc<RelationGraph>,
    /// One controller per declared resource, built once at startup.
    pub controllers: Arc<Vec<ResourceController>>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(pool: PgPool, graph: RelationGraph, settings: Settings) -> Self {
        let graph = Arc::new(graph);
        let controllers = ResourceController::for_graph(&graph, settings.page_limit);
        AppState {
            pool,
            graph,
            controllers: Arc::new(controllers),
            settings: Arc::new(settings),
        }
    }
}
