//! Airlock broker HTTP server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! dispatch loop, WebSocket infrastructure) so integration tests and the
//! binary entrypoint can both access them.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
