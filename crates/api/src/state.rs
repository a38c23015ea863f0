use std::sync::Arc;

use airlock_core::PayloadSchema;
use airlock_engine::EngineLifecycle;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: airlock_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Submission payload schema, built from `REQUIRED_FIELDS`.
    pub schema: Arc<PayloadSchema>,
    /// WebSocket subscriber registry (result push channel).
    pub ws_manager: Arc<WsManager>,
    /// Engine load/unload state, shared with the dispatch loop.
    pub lifecycle: Arc<EngineLifecycle>,
}
