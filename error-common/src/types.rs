use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse failure class shared by every error type in the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Conflict,
    Unauthorized,
    Forbidden,
    NotFound,
    InvalidRequest,
    Internal,
}

impl ErrorCategory {
    /// HTTP status code an adapter should answer with
    pub fn http_status(self) -> u16 {
        match self {
            Self::Conflict => 409,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::InvalidRequest => 400,
            Self::Internal => 500,
        }
    }

    /// Whether the message may be shown to the caller verbatim
    pub fn is_client_facing(self) -> bool {
        !matches!(self, Self::Internal)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::InvalidRequest => "invalid_request",
            Self::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// Implemented by crate-level error enums so adapters can render them uniformly
pub trait Categorized: std::error::Error {
    fn category(&self) -> ErrorCategory;

    /// Stable code from [`crate::codes`]
    fn code(&self) -> &'static str;
}

/// Wire shape for an error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    pub status: u16,
}

impl ErrorBody {
    /// Build a response body, hiding internal details behind a generic message
    pub fn from_error<E: Categorized + ?Sized>(err: &E) -> Self {
        let category = err.category();
        let error = if category.is_client_facing() {
            err.to_string()
        } else {
            "Internal server error".to_string()
        };

        Self {
            error,
            code: err.code().to_string(),
            status: category.http_status(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.error,
            "code": self.code,
            "status": self.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;

    #[derive(Debug, thiserror::Error)]
    #[error("connection refused to 10.0.0.4:5432")]
    struct PoolDown;

    impl Categorized for PoolDown {
        fn category(&self) -> ErrorCategory {
            ErrorCategory::Internal
        }

        fn code(&self) -> &'static str {
            codes::internal::STORAGE
        }
    }

    #[test]
    fn test_internal_errors_are_masked() {
        let body = ErrorBody::from_error(&PoolDown);
        assert_eq!(body.status, 500);
        assert_eq!(body.error, "Internal server error");
        assert_eq!(body.code, "INTERNAL_9001");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCategory::Conflict.http_status(), 409);
        assert_eq!(ErrorCategory::Unauthorized.http_status(), 401);
        assert_eq!(ErrorCategory::Forbidden.http_status(), 403);
        assert_eq!(ErrorCategory::NotFound.http_status(), 404);
        assert_eq!(ErrorCategory::InvalidRequest.http_status(), 400);
    }
}
