use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use domain::{Collection, DomainError, Store};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod gateway;
pub mod query;
pub mod services;

pub use gateway::PersistenceGateway;
pub use query::{
    ApplicationQuery, JobListParams, JobQuery, SearchField, SearchTerm, UserQuery,
};
pub use services::{ApplicationService, JobService, SectorService, UserService};

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{} '{id}' not found", .collection.record_label())]
    NotFound { collection: Collection, id: String },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError), // Propagate domain errors cleanly
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

// --- Infrastructure Interfaces (Traits) ---

/// Durable home of the store document.
///
/// Implementations read and write the whole document at once; there is no
/// incremental update. A failed `load` never yields a partial store.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Reads and parses the entire document.
    async fn load(&self) -> Result<Store, ApplicationError>;
    /// Replaces the entire document.
    async fn save(&self, store: &Store) -> Result<(), ApplicationError>;
}

// --- Helpers ---

/// Current UTC time as RFC 3339 with millisecond precision, e.g. `2024-03-01T10:00:00.000Z`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Extracts the field map of a merge-patch body.
pub(crate) fn patch_fields(body: Value) -> Result<Map<String, Value>, ApplicationError> {
    match body {
        Value::Object(fields) => Ok(fields),
        other => Err(ApplicationError::InvalidInput(format!(
            "Request body must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamps_use_millisecond_zulu_format() {
        let stamp = now_timestamp();
        assert!(stamp.ends_with('Z'), "{stamp}");
        // 2024-03-01T10:00:00.000Z
        assert_eq!(stamp.len(), 24, "{stamp}");
        assert_eq!(&stamp[19..20], ".");
    }

    #[test]
    fn patch_body_must_be_an_object() {
        assert!(patch_fields(json!({ "status": "accepted" })).is_ok());
        let err = patch_fields(json!([1, 2])).unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidInput(msg) if msg.contains("an array")));
    }

    #[test]
    fn not_found_message_names_the_record_kind() {
        let err = ApplicationError::NotFound {
            collection: Collection::Jobs,
            id: "999".to_string(),
        };
        assert_eq!(err.to_string(), "Job '999' not found");
    }
}
