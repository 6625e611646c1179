use thiserror::Error;

use error_common::{codes, Categorized, ErrorCategory};

/// SQLSTATE raised by Postgres on a unique index violation
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A uniqueness constraint rejected the write; carries the constraint name when known
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DatabaseError {
    /// Classify a driver error, tagging it with the operation that produced it
    pub fn from_sqlx(err: sqlx::Error, operation: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Self::Conflict(db.constraint().unwrap_or(operation).to_string())
            }
            sqlx::Error::RowNotFound => Self::NotFound(operation.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::ConnectionFailed(format!("{operation}: {err}"))
            }
            _ => Self::QueryFailed(format!("{operation}: {err}")),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        Self::from_sqlx(err, "query")
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::MigrationError(err.to_string())
    }
}

impl Categorized for DatabaseError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::NotFound(_) => ErrorCategory::NotFound,
            _ => ErrorCategory::Internal,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Conflict(_) => codes::conflict::DUPLICATE_RECORD,
            Self::NotFound(_) => codes::not_found::RESOURCE,
            Self::Configuration(_) => codes::internal::CONFIGURATION,
            _ => codes::internal::STORAGE,
        }
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound, "find role");
        assert!(matches!(err, DatabaseError::NotFound(ref op) if op == "find role"));
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_pool_errors_are_connection_failures() {
        let err = DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut, "acquire");
        assert!(matches!(err, DatabaseError::ConnectionFailed(_)));
        assert_eq!(err.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_variant_categories_and_codes() {
        let query = DatabaseError::from_sqlx(sqlx::Error::ColumnNotFound("phone".into()), "find user");
        assert!(matches!(query, DatabaseError::QueryFailed(ref msg) if msg.starts_with("find user")));

        let cases = [
            (DatabaseError::Conflict("users_phone_live_key".into()), ErrorCategory::Conflict, codes::conflict::DUPLICATE_RECORD),
            (DatabaseError::NotFound("user".into()), ErrorCategory::NotFound, codes::not_found::RESOURCE),
            (DatabaseError::Configuration("DATABASE_URL".into()), ErrorCategory::Internal, codes::internal::CONFIGURATION),
            (DatabaseError::MigrationError("checksum".into()), ErrorCategory::Internal, codes::internal::STORAGE),
            (DatabaseError::InternalError("poisoned".into()), ErrorCategory::Internal, codes::internal::STORAGE),
            (query, ErrorCategory::Internal, codes::internal::STORAGE),
        ];
        for (err, category, code) in cases {
            assert_eq!(err.category(), category, "{err}");
            assert_eq!(err.code(), code, "{err}");
        }
    }
}
