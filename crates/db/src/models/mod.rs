pub mod job;
pub mod status;

pub use job::{Job, NewJob, PruneOutcome, QueueCounts};
pub use status::{CallbackMode, JobStatus, ResultFormat};
