use thiserror::Error;

/// Errors that can occur when interacting with the marketplace store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write found the row in an unexpected state, or a
    /// uniqueness rule was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A row the caller expected to exist was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A stored value could not be turned back into a domain value.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The backend refused the operation for a non-database reason.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// SQLSTATEs PostgreSQL raises when it aborts one side of a race.
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";

/// Returns true for errors that mean "lost a race, retry may succeed".
fn is_transient_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| code == DEADLOCK_DETECTED || code == SERIALIZATION_FAILURE),
        _ => false,
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_conflict(&err) {
            tracing::warn!(error = %err, "transaction aborted by the database");
            return StoreError::Conflict(format!("concurrent update, try again: {err}"));
        }
        StoreError::Database(err)
    }
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
