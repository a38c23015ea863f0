//! Submission payload validation.
//!
//! The broker treats job payloads as opaque documents for the backing
//! engine, with one exception: at submission time it checks that the
//! top-level fields the engine requires are present, so malformed jobs are
//! rejected before anything is persisted. Which fields are required is
//! deployment configuration, not code.

use crate::error::CoreError;

/// The set of top-level payload fields a deployment's engine requires.
#[derive(Debug, Clone, Default)]
pub struct PayloadSchema {
    required: Vec<String>,
}

impl PayloadSchema {
    /// Build a schema from an explicit field list.
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }

    /// Parse a schema from a comma-separated list (the `REQUIRED_FIELDS`
    /// environment variable). Empty entries are ignored; an empty list
    /// means any JSON object is accepted.
    pub fn from_comma_list(list: &str) -> Self {
        let required = list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self { required }
    }

    /// The configured required field names.
    pub fn required_fields(&self) -> &[String] {
        &self.required
    }

    /// Validate a submitted payload.
    ///
    /// The payload must be a JSON object, and every required field must be
    /// present with a non-null value. Nested structure is not inspected;
    /// only the engine understands payload internals.
    pub fn validate(&self, payload: &serde_json::Value) -> Result<(), CoreError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| CoreError::Validation("Payload must be a JSON object".into()))?;

        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|field| matches!(obj.get(field.as_str()), None | Some(serde_json::Value::Null)))
            .map(|field| field.as_str())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Missing required payload fields: {}",
                missing.join(", ")
            )))
        }
    }
}
