use auth_identity::ActorKind;
use database_layer::DatabaseError;
use error_common::{codes, Categorized, ErrorCategory};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Missing authentication token")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Session has been terminated")]
    SessionTerminated,

    #[error("This operation is not available to {actual} users")]
    WrongActorKind { actual: ActorKind },

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

impl Categorized for GuardError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingToken | Self::InvalidToken | Self::SessionTerminated | Self::Unauthenticated => {
                ErrorCategory::Unauthorized
            }
            Self::WrongActorKind { .. } | Self::InsufficientPermissions => ErrorCategory::Forbidden,
            Self::Storage(_) => ErrorCategory::Internal,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::MissingToken | Self::Unauthenticated => codes::authentication::MISSING_TOKEN,
            Self::InvalidToken => codes::authentication::TOKEN_INVALID,
            Self::SessionTerminated => codes::authentication::SESSION_INVALID,
            Self::WrongActorKind { .. } => codes::authorization::WRONG_ACTOR_KIND,
            Self::InsufficientPermissions => codes::authorization::INSUFFICIENT_PERMISSIONS,
            Self::Storage(_) => codes::internal::STORAGE,
        }
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
