use thiserror::Error;

/// Errors that can occur when interacting with a repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An optimistic-concurrency conflict: the entity was modified by someone
    /// else between read and write.
    #[error("Concurrency conflict updating {entity} {id}")]
    ConcurrencyConflict { entity: &'static str, id: String },

    /// A uniqueness constraint was violated.
    #[error("Duplicate key for {constraint}: {value}")]
    DuplicateKey {
        constraint: &'static str,
        value: String,
    },

    /// The entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StoreError>;
