use database_layer::DatabaseError;
use error_common::{codes, Categorized, ErrorCategory};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IdentityError {
    // Conflict
    #[error("Phone number is already registered")]
    PhoneTaken,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("Role '{0}' already exists")]
    RoleNameTaken(String),

    #[error("Permission '{0}' already exists")]
    PermissionKeyTaken(String),

    #[error("Permission group '{0}' already exists")]
    PermissionGroupTaken(String),

    #[error("User already has this role assigned")]
    DuplicateAssignment,

    #[error("Role is assigned to active users and cannot be deleted")]
    RoleInUse,

    // Unauthorized
    #[error("Invalid phone or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid or expired role selection token")]
    InvalidRoleSelectionToken,

    #[error("Invalid or expired refresh token")]
    RefreshRejected,

    // Forbidden
    #[error("Your account has been banned")]
    AccountBanned,

    #[error("Your account has been suspended")]
    AccountSuspended,

    #[error("Administrator accounts cannot be created through signup")]
    AdminSignupForbidden,

    #[error("No active administrator role is assigned to this account")]
    NoAdminRole,

    #[error("The selected role is not assigned to this account")]
    RoleNotAssigned,

    #[error("Role selection is only available to administrators")]
    NotAnAdmin,

    #[error("System roles cannot be deleted or deactivated")]
    SystemRoleProtected,

    // Not found
    #[error("User not found")]
    UserNotFound,

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Permission not found: {0}")]
    PermissionNotFound(String),

    #[error("Permission group not found: {0}")]
    PermissionGroupNotFound(Uuid),

    #[error("Role assignment not found")]
    AssignmentNotFound,

    // Invalid request
    #[error("Actor kind mismatch: {0}")]
    ActorKindMismatch(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Internal
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token signing failed: {0}")]
    TokenSigning(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Default role '{0}' is missing, run the seed command")]
    MissingDefaultRole(String),

    #[error("Storage error: {0}")]
    Storage(#[source] DatabaseError),
}

impl From<DatabaseError> for IdentityError {
    fn from(err: DatabaseError) -> Self {
        match &err {
            DatabaseError::Conflict(constraint) if constraint.contains("phone") => Self::PhoneTaken,
            DatabaseError::Conflict(constraint) if constraint.contains("email") => Self::EmailTaken,
            DatabaseError::Conflict(constraint) if constraint.contains("user_roles") => {
                Self::DuplicateAssignment
            }
            _ => Self::Storage(err),
        }
    }
}

impl Categorized for IdentityError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::PhoneTaken
            | Self::EmailTaken
            | Self::RoleNameTaken(_)
            | Self::PermissionKeyTaken(_)
            | Self::PermissionGroupTaken(_)
            | Self::DuplicateAssignment
            | Self::RoleInUse => ErrorCategory::Conflict,

            Self::InvalidCredentials
            | Self::InvalidToken
            | Self::InvalidRoleSelectionToken
            | Self::RefreshRejected => ErrorCategory::Unauthorized,

            Self::AccountBanned
            | Self::AccountSuspended
            | Self::AdminSignupForbidden
            | Self::NoAdminRole
            | Self::RoleNotAssigned
            | Self::NotAnAdmin
            | Self::SystemRoleProtected => ErrorCategory::Forbidden,

            Self::UserNotFound
            | Self::RoleNotFound(_)
            | Self::PermissionNotFound(_)
            | Self::PermissionGroupNotFound(_)
            | Self::AssignmentNotFound => ErrorCategory::NotFound,

            Self::ActorKindMismatch(_) | Self::Validation(_) => ErrorCategory::InvalidRequest,

            Self::Storage(inner) => inner.category(),

            Self::Hashing(_) | Self::TokenSigning(_) | Self::Config(_) | Self::MissingDefaultRole(_) => {
                ErrorCategory::Internal
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::PhoneTaken => codes::conflict::DUPLICATE_PHONE,
            Self::EmailTaken => codes::conflict::DUPLICATE_EMAIL,
            Self::RoleNameTaken(_) => codes::conflict::DUPLICATE_ROLE,
            Self::PermissionKeyTaken(_) => codes::conflict::DUPLICATE_PERMISSION,
            Self::PermissionGroupTaken(_) => codes::conflict::DUPLICATE_PERMISSION_GROUP,
            Self::DuplicateAssignment => codes::conflict::DUPLICATE_ASSIGNMENT,
            Self::RoleInUse => codes::conflict::RESOURCE_IN_USE,

            Self::InvalidCredentials => codes::authentication::INVALID_CREDENTIALS,
            Self::InvalidToken | Self::InvalidRoleSelectionToken => codes::authentication::TOKEN_INVALID,
            Self::RefreshRejected => codes::authentication::REFRESH_REJECTED,

            Self::AccountBanned | Self::AccountSuspended => codes::authorization::ACCOUNT_RESTRICTED,
            Self::AdminSignupForbidden | Self::NotAnAdmin => codes::authorization::WRONG_ACTOR_KIND,
            Self::NoAdminRole | Self::RoleNotAssigned => codes::authorization::ROLE_NOT_ASSIGNED,
            Self::SystemRoleProtected => codes::authorization::PROTECTED_RESOURCE,

            Self::UserNotFound => codes::not_found::USER,
            Self::RoleNotFound(_) => codes::not_found::ROLE,
            Self::PermissionNotFound(_) | Self::PermissionGroupNotFound(_) => codes::not_found::PERMISSION,
            Self::AssignmentNotFound => codes::not_found::RESOURCE,

            Self::ActorKindMismatch(_) => codes::validation::ACTOR_KIND_MISMATCH,
            Self::Validation(_) => codes::validation::INVALID_INPUT,

            Self::Hashing(_) => codes::internal::HASHING,
            Self::TokenSigning(_) => codes::internal::TOKEN_SIGNING,
            Self::Config(_) | Self::MissingDefaultRole(_) => codes::internal::CONFIGURATION,
            Self::Storage(inner) => inner.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
