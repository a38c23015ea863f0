//! Route definitions.
//!
//! The broker's whole surface, mounted at the root:
//!
//! ```text
//! GET    /health         service + database health
//! POST   /execute        submit a job
//! POST   /generate       submit a job and wait for its result
//! GET    /jobs/{id}      fetch a job row (poll / recovery path)
//! GET    /status         engine residency + queue depth
//! GET    /ws/{job_id}    result push subscription (WebSocket)
//! ```

pub mod health;
pub mod jobs;
pub mod system;
