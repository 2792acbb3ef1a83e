use thiserror::Error;

use crate::models::PathError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Batch of {size} writes exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[cfg(feature = "database-sqlite")]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[cfg(feature = "database-sqlite")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PathError> for DbError {
    fn from(err: PathError) -> Self {
        DbError::Validation(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
