//! The engine boundary and its resource lifecycle.
//!
//! An [`Engine`] is the opaque heavy backend a broker instance fronts:
//! GPU-resident model weights, or a subprocess environment. The broker
//! never looks inside a job payload; it hands the payload to the engine
//! and gets back an artifact path or an error.
//!
//! [`EngineLifecycle`] wraps an engine with the lazy-load / idle-unload
//! policy: load on first claim, unload after a configurable quiet period,
//! so the scarce resource (device memory) is held only across bursts of
//! work.

pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod subprocess;

pub use engine::Engine;
pub use error::EngineError;
pub use lifecycle::EngineLifecycle;
pub use subprocess::{SubprocessConfig, SubprocessEngine};
