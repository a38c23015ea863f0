/// Job identifiers are UUIDv4 in hyphenated string form, assigned at
/// submission and used verbatim as database primary keys, WebSocket
/// subscription keys, and artifact file stems.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh job identifier.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}
