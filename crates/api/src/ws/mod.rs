//! WebSocket infrastructure for the result push channel.
//!
//! Provides the per-job subscriber registry, heartbeat monitoring, and
//! the HTTP upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
