use crate::core::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("No result for query '{query}'")]
    NoResult { query: String },

    #[error("Query '{query}' returned {count} results, expected exactly one")]
    NonUniqueResult { query: String, count: usize },

    /// Version stamp of a loaded entity differs from the one the caller expected.
    #[error("Optimistic lock conflict on {entity_name}: expected version {expected}, found {actual}")]
    OptimisticLock {
        entity_name: String,
        entity: serde_json::Value,
        expected: Value,
        actual: Value,
    },

    /// Entity metadata is missing or inconsistent. Not recoverable by retrying.
    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Not an entity: {0}")]
    NotAnEntity(String),

    #[error("Entity already exists: {0}")]
    EntityExists(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PersistenceError {
    /// Whether the error is a version conflict the caller may resolve by reloading.
    pub fn is_optimistic_lock(&self) -> bool {
        matches!(self, Self::OptimisticLock { .. })
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
