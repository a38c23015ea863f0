//! Outbound result delivery for finished jobs.
//!
//! Implements the callback side of the broker's result channel: one HTTP
//! POST per terminal job to the caller-supplied URL, in the format the
//! job requested (path reference, raw bytes, or inline base64). There is
//! deliberately no retry here; the job row remains the durable record
//! and pollers recover anything a flaky consumer missed.

pub mod artifact;
pub mod callback;
pub mod error;

pub use artifact::{mime_for_extension, move_artifact};
pub use callback::CallbackDelivery;
pub use error::DeliveryError;
